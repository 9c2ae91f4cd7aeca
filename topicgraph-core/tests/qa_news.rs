//! QA tests for news-job polling under virtual time.

use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use topicgraph_core::testing::ScriptedNewsFeed;
use topicgraph_core::{JobStatus, NewsJobManager, StaticCredentials, NEWS_POLL_INTERVAL};

fn manager(feed: Arc<ScriptedNewsFeed>) -> NewsJobManager {
    NewsJobManager::new(feed, Arc::new(StaticCredentials::new("user-token")))
}

#[tokio::test(start_paused = true)]
async fn test_pending_processing_completed_polls_twice() {
    let feed = Arc::new(ScriptedNewsFeed::new());
    feed.push_receipt("sum-1", JobStatus::Pending);
    feed.push_job(ScriptedNewsFeed::job("sum-1", JobStatus::Processing, ""));
    feed.push_job(ScriptedNewsFeed::job(
        "sum-1",
        JobStatus::Completed,
        "## This Week\n- a development",
    ));
    let manager = manager(feed.clone());

    let id = manager
        .create_job(&["A".to_string(), "B".to_string()])
        .await
        .unwrap();
    assert_eq!(manager.cached(&id).unwrap().status, JobStatus::Pending);

    let job = manager
        .poll_to_completion(&id, CancellationToken::new())
        .await
        .unwrap()
        .expect("job should complete");

    assert_eq!(job.status, JobStatus::Completed);
    assert!(!job.summary_markdown.is_empty());
    assert_eq!(feed.fetch_calls(), 2, "polling must stop at the terminal poll");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_loop_stops_polling() {
    let feed = Arc::new(ScriptedNewsFeed::new());
    // Enough scripted states that the loop would happily keep going.
    for _ in 0..4 {
        feed.push_job(ScriptedNewsFeed::job("sum-2", JobStatus::Processing, ""));
    }
    let manager = manager(feed.clone());

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    let (outcome, _) = tokio::join!(
        manager.poll_to_completion("sum-2", cancel),
        async move {
            // Fires between the first poll (t = 2s) and the second (t = 4s).
            tokio::time::sleep(NEWS_POLL_INTERVAL + Duration::from_millis(500)).await;
            canceller.cancel();
        }
    );

    assert!(outcome.unwrap().is_none());
    assert_eq!(feed.fetch_calls(), 1, "no poll may happen after cancellation");
}

#[tokio::test(start_paused = true)]
async fn test_independent_jobs_poll_independently() {
    let feed = Arc::new(ScriptedNewsFeed::new());
    feed.push_job(ScriptedNewsFeed::job("sum-a", JobStatus::Completed, "a"));
    feed.push_job(ScriptedNewsFeed::job("sum-b", JobStatus::Completed, "b"));
    let manager = manager(feed.clone());

    // One loop finishing does not disturb a later one.
    let first = manager
        .poll_to_completion("sum-a", CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    let second = manager
        .poll_to_completion("sum-b", CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(first.summary_markdown, "a");
    assert_eq!(second.summary_markdown, "b");
    assert_eq!(feed.fetch_calls(), 2);
}
