//! Testing utilities: scripted collaborators for deterministic tests.
//!
//! Each fake plays back a queue of scripted responses and counts the calls
//! it receives, so tests can assert both outcomes and interaction counts
//! without any network.

use crate::expand::SubtopicSource;
use crate::voice::{SdpExchange, SessionError, SignalingTransport, TokenIssuer, TransportEvent};
use crate::news::NewsFeed;
use crate::analyze::Summarizer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use topicgraph_api::{Analysis, Error, JobStatus, NewsJob, NewsJobReceipt};

fn exhausted(what: &str) -> Error {
    Error::Network(format!("{what}: no scripted response left"))
}

/// Build a transcript-delta side-channel message.
pub fn delta_message(text: &str) -> String {
    serde_json::json!({
        "type": "response.audio_transcript.delta",
        "delta": text,
    })
    .to_string()
}

// ============================================================================
// Subtopic generation
// ============================================================================

/// A [`SubtopicSource`] that returns scripted responses in order.
#[derive(Default)]
pub struct ScriptedSubtopics {
    responses: Mutex<VecDeque<Result<Vec<String>, Error>>>,
    calls: AtomicUsize,
}

impl ScriptedSubtopics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful generator response.
    pub fn push_subtopics<S: Into<String>>(&self, topics: impl IntoIterator<Item = S>) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(topics.into_iter().map(Into::into).collect()));
    }

    /// Queue a failed generator call.
    pub fn push_failure(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(Error::Network(message.to_string())));
    }

    /// How many times the generator was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubtopicSource for ScriptedSubtopics {
    async fn subtopics(&self, _parent_topic: &str) -> Result<Vec<String>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(exhausted("ScriptedSubtopics")))
    }
}

// ============================================================================
// Conversation analysis
// ============================================================================

/// A [`Summarizer`] that returns scripted analyses in order.
#[derive(Default)]
pub struct ScriptedSummarizer {
    responses: Mutex<VecDeque<Result<Analysis, Error>>>,
    calls: AtomicUsize,
}

impl ScriptedSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful analysis.
    pub fn push_analysis<A, B, C>(
        &self,
        summary: impl IntoIterator<Item = A>,
        key_points: impl IntoIterator<Item = B>,
        suggested_subtopics: impl IntoIterator<Item = C>,
    ) where
        A: Into<String>,
        B: Into<String>,
        C: Into<String>,
    {
        let analysis = Analysis {
            summary: summary.into_iter().map(Into::into).collect(),
            key_points: key_points.into_iter().map(Into::into).collect(),
            suggested_subtopics: suggested_subtopics.into_iter().map(Into::into).collect(),
        };
        self.responses.lock().unwrap().push_back(Ok(analysis));
    }

    /// Queue a failed summarization call.
    pub fn push_failure(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(Error::Network(message.to_string())));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, _transcript: &str, _parent_topic: &str) -> Result<Analysis, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(exhausted("ScriptedSummarizer")))
    }
}

// ============================================================================
// Voice session collaborators
// ============================================================================

/// A [`SignalingTransport`] that plays back a scripted event stream.
pub struct ScriptedTransport {
    events: VecDeque<TransportEvent>,
    fail_capture: Option<String>,
    fail_offer: Option<String>,
    remote_answer: Option<String>,
    closes: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn with_events(events: Vec<TransportEvent>) -> Self {
        Self {
            events: events.into(),
            fail_capture: None,
            fail_offer: None,
            remote_answer: None,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make local media capture fail.
    pub fn fail_capture(&mut self, message: &str) {
        self.fail_capture = Some(message.to_string());
    }

    /// Make offer creation fail.
    pub fn fail_offer(&mut self, message: &str) {
        self.fail_offer = Some(message.to_string());
    }

    /// Shared close counter, usable after the transport is boxed away.
    pub fn close_count(&self) -> Arc<AtomicUsize> {
        self.closes.clone()
    }

    /// The remote answer that was applied, if any.
    pub fn applied_answer(&self) -> Option<&str> {
        self.remote_answer.as_deref()
    }
}

#[async_trait]
impl SignalingTransport for ScriptedTransport {
    async fn capture_local_media(&mut self) -> Result<(), SessionError> {
        match self.fail_capture.take() {
            Some(message) => Err(SessionError::Media(message)),
            None => Ok(()),
        }
    }

    async fn create_offer(&mut self) -> Result<String, SessionError> {
        match self.fail_offer.take() {
            Some(message) => Err(SessionError::Signaling(message)),
            None => Ok("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=-\r\n".to_string()),
        }
    }

    async fn set_remote_answer(&mut self, answer: &str) -> Result<(), SessionError> {
        self.remote_answer = Some(answer.to_string());
        Ok(())
    }

    async fn next_event(&mut self) -> Result<TransportEvent, SessionError> {
        Ok(self.events.pop_front().unwrap_or(TransportEvent::Closed))
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// A [`TokenIssuer`] with a fixed credential or a fixed failure.
pub struct StaticTokenIssuer {
    result: Result<String, String>,
}

impl StaticTokenIssuer {
    pub fn new(token: &str) -> Self {
        Self {
            result: Ok(token.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl TokenIssuer for StaticTokenIssuer {
    async fn issue(&self, _topic: &str) -> Result<String, Error> {
        match &self.result {
            Ok(token) => Ok(token.clone()),
            Err(message) => Err(Error::Network(message.clone())),
        }
    }
}

/// An [`SdpExchange`] that answers every offer and records the exchange.
#[derive(Default)]
pub struct EchoSignaling {
    last: Mutex<Option<(String, String)>>,
    failure: Option<String>,
}

impl EchoSignaling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            last: Mutex::new(None),
            failure: Some(message.to_string()),
        }
    }

    /// The (offer, credential) pair from the most recent exchange.
    pub fn last_exchange(&self) -> Option<(String, String)> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl SdpExchange for EchoSignaling {
    async fn exchange(&self, offer_sdp: &str, credential: &str) -> Result<String, Error> {
        if let Some(message) = &self.failure {
            return Err(Error::Network(message.clone()));
        }
        *self.last.lock().unwrap() = Some((offer_sdp.to_string(), credential.to_string()));
        Ok("v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=answer\r\n".to_string())
    }
}

// ============================================================================
// News jobs
// ============================================================================

/// A [`NewsFeed`] backed by scripted receipts, job states, and listings.
#[derive(Default)]
pub struct ScriptedNewsFeed {
    receipts: Mutex<VecDeque<NewsJobReceipt>>,
    fetches: Mutex<VecDeque<Result<NewsJob, Error>>>,
    listings: Mutex<VecDeque<Vec<NewsJob>>>,
    create_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl ScriptedNewsFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// A job record with the current time as `created_at`.
    pub fn job(id: &str, status: JobStatus, summary_markdown: &str) -> NewsJob {
        NewsJob {
            id: id.to_string(),
            topics: vec!["A".to_string(), "B".to_string()],
            status,
            summary_markdown: summary_markdown.to_string(),
            error_message: None,
            created_at: Utc::now(),
        }
    }

    /// A job record with a fixed `created_at`, for ordering tests.
    pub fn job_at(id: &str, status: JobStatus, summary_markdown: &str, epoch_secs: i64) -> NewsJob {
        NewsJob {
            created_at: DateTime::from_timestamp(epoch_secs, 0).expect("valid timestamp"),
            ..Self::job(id, status, summary_markdown)
        }
    }

    pub fn push_receipt(&self, id: &str, status: JobStatus) {
        self.receipts.lock().unwrap().push_back(NewsJobReceipt {
            summary_id: id.to_string(),
            status,
            message: String::new(),
        });
    }

    pub fn push_job(&self, job: NewsJob) {
        self.fetches.lock().unwrap().push_back(Ok(job));
    }

    pub fn push_fetch_failure(&self, message: &str) {
        self.fetches
            .lock()
            .unwrap()
            .push_back(Err(Error::Network(message.to_string())));
    }

    pub fn push_listing(&self, jobs: Vec<NewsJob>) {
        self.listings.lock().unwrap().push_back(jobs);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsFeed for ScriptedNewsFeed {
    async fn create(&self, _topics: &[String], _token: &str) -> Result<NewsJobReceipt, Error> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.receipts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| exhausted("ScriptedNewsFeed::create"))
    }

    async fn fetch(&self, _id: &str, _token: &str) -> Result<NewsJob, Error> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(exhausted("ScriptedNewsFeed::fetch")))
    }

    async fn list(&self, _token: &str) -> Result<Vec<NewsJob>, Error> {
        self.listings
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| exhausted("ScriptedNewsFeed::list"))
    }
}
