//! Minimal HTTP client for the topic-graph enrichment backend.
//!
//! This crate provides a focused client for the backend endpoints the
//! graph engine depends on:
//! - Subtopic generation and conversation summarization
//! - Ephemeral voice-session credentials and the real-time SDP exchange
//! - Topic-news job creation, polling, and history
//! - User topic persistence (save/load of the graph snapshot)

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "http://localhost:5001";
const DEFAULT_REALTIME_URL: &str = "https://api.openai.com/v1/realtime";
const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Errors that can occur when calling the backend or the real-time endpoint.
#[derive(Debug, Error)]
pub enum Error {
    #[error("No credentials available: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Supplies bearer tokens for the user-scoped endpoints.
///
/// The persistence and news endpoints belong to a signed-in user; where the
/// token comes from (an auth session, a keychain, a fixture) is not this
/// crate's concern.
#[async_trait::async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a currently valid bearer token, or an auth error.
    async fn current_token(&self) -> Result<String, Error>;
}

/// A fixed-token credential provider.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialProvider for StaticCredentials {
    async fn current_token(&self) -> Result<String, Error> {
        Ok(self.token.clone())
    }
}

/// Backend API client.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    realtime_url: String,
    realtime_model: String,
}

impl Client {
    /// Create a client against the default local backend.
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client against the given backend root URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: trim_trailing_slash(base_url.into()),
            realtime_url: DEFAULT_REALTIME_URL.to_string(),
            realtime_model: DEFAULT_REALTIME_MODEL.to_string(),
        }
    }

    /// Create a client from the `TOPICGRAPH_BACKEND_URL` environment
    /// variable, falling back to the default local backend.
    pub fn from_env() -> Self {
        match std::env::var("TOPICGRAPH_BACKEND_URL") {
            Ok(url) => Self::with_base_url(url),
            Err(_) => Self::new(),
        }
    }

    /// Override the real-time conversational endpoint.
    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = trim_trailing_slash(url.into());
        self
    }

    /// Override the real-time model.
    pub fn with_realtime_model(mut self, model: impl Into<String>) -> Self {
        self.realtime_model = model.into();
        self
    }

    /// Generate subtopics for a parent topic.
    pub async fn generate_subtopics(&self, parent_topic: &str) -> Result<Vec<String>, Error> {
        let response: SubtopicsResponse = self
            .post_json(
                &self.api_url("/generate-subtopics"),
                &SubtopicsRequest { parent_topic },
                None,
            )
            .await?;
        Ok(response.subtopics)
    }

    /// Summarize a finished conversation transcript about a topic.
    pub async fn summarize_conversation(
        &self,
        transcript: &str,
        parent_topic: &str,
    ) -> Result<Analysis, Error> {
        self.post_json(
            &self.api_url("/summarize-conversation"),
            &SummarizeRequest {
                transcript,
                parent_topic,
            },
            None,
        )
        .await
    }

    /// Request an ephemeral credential for a voice session about `topic`.
    pub async fn create_voice_session(&self, topic: &str) -> Result<String, Error> {
        let response: SessionResponse = self
            .post_json(&self.api_url("/session"), &SessionRequest { topic }, None)
            .await?;
        Ok(response.client_secret.value)
    }

    /// Exchange a local SDP offer for the remote answer.
    ///
    /// The offer is posted verbatim to the real-time endpoint, authorized
    /// with the ephemeral credential; the response body is the answer SDP.
    pub async fn exchange_sdp(&self, offer_sdp: &str, credential: &str) -> Result<String, Error> {
        let url = format!("{}?model={}", self.realtime_url, self.realtime_model);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/sdp"));
        headers.insert(AUTHORIZATION, bearer(credential)?);

        let response = self
            .http
            .post(url)
            .headers(headers)
            .body(offer_sdp.to_string())
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let response = check_status(response).await?;
        response.text().await.map_err(|e| Error::Parse(e.to_string()))
    }

    /// Create a background news-digest job for a set of topics.
    pub async fn create_news_job(
        &self,
        topics: &[String],
        token: &str,
    ) -> Result<NewsJobReceipt, Error> {
        self.post_json(
            &self.api_url("/topic-news"),
            &NewsJobRequest { topics },
            Some(token),
        )
        .await
    }

    /// Read the current remote state of one news job.
    pub async fn get_news_job(&self, id: &str, token: &str) -> Result<NewsJob, Error> {
        self.get_json(&self.api_url(&format!("/topic-news/{id}")), Some(token))
            .await
    }

    /// List all news jobs for the current user.
    pub async fn list_news_jobs(&self, token: &str) -> Result<Vec<NewsJob>, Error> {
        let response: NewsJobList = self
            .get_json(&self.api_url("/topic-news"), Some(token))
            .await?;
        Ok(response.summaries)
    }

    /// Save the user's topic graph.
    pub async fn save_topics(&self, payload: &TopicsPayload, token: &str) -> Result<(), Error> {
        let _: serde_json::Value = self
            .post_json(&self.api_url("/user/topics"), payload, Some(token))
            .await?;
        Ok(())
    }

    /// Load the user's topic graph.
    pub async fn load_topics(&self, token: &str) -> Result<StoredTopics, Error> {
        self.get_json(&self.api_url("/user/topics"), Some(token))
            .await
    }

    /// Probe the backend liveness endpoint.
    pub async fn health(&self) -> Result<(), Error> {
        let _: serde_json::Value = self
            .get_json(&format!("{}/health", self.base_url), None)
            .await?;
        Ok(())
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{path}", self.base_url)
    }

    async fn post_json<B, R>(&self, url: &str, body: &B, token: Option<&str>) -> Result<R, Error>
    where
        B: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let mut request = self.http.post(url).json(body);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, bearer(token)?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let response = check_status(response).await?;
        response.json().await.map_err(|e| Error::Parse(e.to_string()))
    }

    async fn get_json<R>(&self, url: &str, token: Option<&str>) -> Result<R, Error>
    where
        R: serde::de::DeserializeOwned,
    {
        let mut request = self.http.get(url);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, bearer(token)?);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let response = check_status(response).await?;
        response.json().await.map_err(|e| Error::Parse(e.to_string()))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    tracing::debug!(status, "backend request failed");
    Err(Error::Api { status, message })
}

fn bearer(token: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| Error::Config(format!("Invalid bearer token: {e}")))
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

// ============================================================================
// Public types
// ============================================================================

/// Structured result of analyzing a conversation transcript.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    /// Concise bullet points covering the main concepts.
    pub summary: Vec<String>,

    /// More specific factual details.
    pub key_points: Vec<String>,

    /// Topics worth adding to the graph as separate nodes.
    #[serde(default)]
    pub suggested_subtopics: Vec<String>,
}

/// Remote lifecycle state of a news job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the job has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A news-digest job as reported by the backend.
///
/// Jobs are mutated only by the remote processor; once `status` is terminal
/// the record never changes again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsJob {
    pub id: String,
    pub topics: Vec<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub summary_markdown: String,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Acknowledgement returned when a news job is created.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsJobReceipt {
    pub summary_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub message: String,
}

/// One persisted topic, flattened node + metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub id: String,
    pub name: String,
    pub color: String,
    pub size: f32,
    pub expanded: bool,
    pub notes: String,
}

/// A parent -> subtopic relation in the save payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipRecord {
    pub source: String,
    pub target: String,
}

/// Save payload for `POST /user/topics`.
#[derive(Debug, Clone, Serialize)]
pub struct TopicsPayload {
    pub topics: Vec<TopicRecord>,
    pub relationships: Vec<RelationshipRecord>,
}

/// A relation as returned by `GET /user/topics`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredRelationship {
    pub source_topic_id: String,
    pub target_topic_id: String,
}

/// Load response from `GET /user/topics`.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredTopics {
    pub topics: Vec<TopicRecord>,
    pub relationships: Vec<StoredRelationship>,
}

// ============================================================================
// Internal request/response types
// ============================================================================

#[derive(Debug, Serialize)]
struct SubtopicsRequest<'a> {
    parent_topic: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubtopicsResponse {
    subtopics: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SummarizeRequest<'a> {
    transcript: &'a str,
    parent_topic: &'a str,
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    topic: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

#[derive(Debug, Serialize)]
struct NewsJobRequest<'a> {
    topics: &'a [String],
}

#[derive(Debug, Deserialize)]
struct NewsJobList {
    summaries: Vec<NewsJob>,
}
