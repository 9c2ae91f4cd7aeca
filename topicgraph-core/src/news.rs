//! Background news-digest jobs for a set of topics.
//!
//! Jobs run remotely; this manager creates them, mirrors their state in a
//! client-side cache, and drives a cancellable fixed-interval poll loop to
//! completion. It never touches the graph store; topic names are its only
//! seed input. Every method takes `&self`, so loops for different jobs can
//! run concurrently; running two loops for the same job is the caller's
//! mistake to avoid.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use topicgraph_api::{CredentialProvider, NewsJob, NewsJobReceipt};
use tracing::debug;

/// Fixed delay between job polls.
pub const NEWS_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Remote news-job endpoints.
#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn create(
        &self,
        topics: &[String],
        token: &str,
    ) -> Result<NewsJobReceipt, topicgraph_api::Error>;

    async fn fetch(&self, id: &str, token: &str) -> Result<NewsJob, topicgraph_api::Error>;

    async fn list(&self, token: &str) -> Result<Vec<NewsJob>, topicgraph_api::Error>;
}

#[async_trait]
impl NewsFeed for topicgraph_api::Client {
    async fn create(
        &self,
        topics: &[String],
        token: &str,
    ) -> Result<NewsJobReceipt, topicgraph_api::Error> {
        self.create_news_job(topics, token).await
    }

    async fn fetch(&self, id: &str, token: &str) -> Result<NewsJob, topicgraph_api::Error> {
        self.get_news_job(id, token).await
    }

    async fn list(&self, token: &str) -> Result<Vec<NewsJob>, topicgraph_api::Error> {
        self.list_news_jobs(token).await
    }
}

/// Errors from news-job operations.
#[derive(Debug, Error)]
pub enum NewsError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("News request failed: {0}")]
    Remote(#[from] topicgraph_api::Error),
}

/// Creates and tracks news-digest jobs.
pub struct NewsJobManager {
    feed: Arc<dyn NewsFeed>,
    credentials: Arc<dyn CredentialProvider>,
    jobs: Mutex<HashMap<String, NewsJob>>,
}

impl NewsJobManager {
    pub fn new(feed: Arc<dyn NewsFeed>, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            feed,
            credentials,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Create a job for a non-empty topic set and return its id.
    ///
    /// An empty topic list is rejected before any credential lookup or
    /// network call. Duplicate topics are dropped, keeping first-seen order.
    pub async fn create_job(&self, topics: &[String]) -> Result<String, NewsError> {
        let mut seen = std::collections::HashSet::new();
        let topics: Vec<String> = topics
            .iter()
            .filter(|topic| seen.insert(topic.as_str()))
            .cloned()
            .collect();
        if topics.is_empty() {
            return Err(NewsError::InvalidRequest(
                "at least one topic is required".to_string(),
            ));
        }

        let token = self.credentials.current_token().await?;
        let receipt = self.feed.create(&topics, &token).await?;
        debug!(job = %receipt.summary_id, topics = topics.len(), "created news job");

        let job = NewsJob {
            id: receipt.summary_id.clone(),
            topics,
            status: receipt.status,
            summary_markdown: String::new(),
            error_message: None,
            created_at: Utc::now(),
        };
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
        Ok(receipt.summary_id)
    }

    /// A single point-in-time read of a job's remote state.
    pub async fn poll_job(&self, id: &str) -> Result<NewsJob, NewsError> {
        let token = self.credentials.current_token().await?;
        let job = self.feed.fetch(id, &token).await?;
        self.jobs
            .lock()
            .unwrap()
            .insert(job.id.clone(), job.clone());
        Ok(job)
    }

    /// All jobs for the user, most recent first.
    pub async fn list_jobs(&self) -> Result<Vec<NewsJob>, NewsError> {
        let token = self.credentials.current_token().await?;
        let mut jobs = self.feed.list(&token).await?;
        sort_most_recent_first(&mut jobs);
        *self.jobs.lock().unwrap() = jobs
            .iter()
            .map(|job| (job.id.clone(), job.clone()))
            .collect();
        Ok(jobs)
    }

    /// The most recent `n` cached jobs, without a remote call.
    pub fn latest(&self, n: usize) -> Vec<NewsJob> {
        let mut jobs: Vec<NewsJob> = self.jobs.lock().unwrap().values().cloned().collect();
        sort_most_recent_first(&mut jobs);
        jobs.truncate(n);
        jobs
    }

    /// The cached view of one job, if any.
    pub fn cached(&self, id: &str) -> Option<NewsJob> {
        self.jobs.lock().unwrap().get(id).cloned()
    }

    /// Poll `id` at [`NEWS_POLL_INTERVAL`] until it reaches a terminal
    /// status, returning the terminal job.
    ///
    /// Returns `Ok(None)` when `cancel` fires: no further poll is issued
    /// afterwards, and an in-flight poll is dropped with its resolution
    /// discarded (the cache is not updated). The first poll happens one
    /// full interval after this call.
    pub async fn poll_to_completion(
        &self,
        id: &str,
        cancel: CancellationToken,
    ) -> Result<Option<NewsJob>, NewsError> {
        let mut ticker = tokio::time::interval(NEWS_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // An interval's first tick completes immediately; consume it so the
        // first poll lands a full interval after job creation.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(job = id, "poll loop cancelled");
                    return Ok(None);
                }
                polled = async {
                    ticker.tick().await;
                    self.poll_job(id).await
                } => {
                    let job = polled?;
                    if job.status.is_terminal() {
                        debug!(job = id, status = %job.status, "news job finished");
                        return Ok(Some(job));
                    }
                }
            }
        }
    }
}

fn sort_most_recent_first(jobs: &mut [NewsJob]) {
    // Tie-break on id so the ordering is total and stable.
    jobs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
