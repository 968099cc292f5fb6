//! Event-driven waits and custom assertions

use comic_courier::{Courier, Event, JobId};
use std::path::Path;
use std::time::Duration;

/// Outcome of waiting for a job's terminal event
#[derive(Debug)]
pub enum WaitResult {
    /// Artifact delivered after `attempts` upload attempts
    Delivered { attempts: u32 },
    /// Job failed with a user-facing error
    Failed(String),
    /// Job was cancelled while queued
    Cancelled,
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for a job to reach a terminal event
///
/// Subscribe before submitting, then pass the receiver in; events published
/// between submission and this call are not lost that way.
pub async fn wait_for_outcome(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    job_id: JobId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Delivered {
                    job_id: id,
                    attempts,
                    ..
                }) if id == job_id => return WaitResult::Delivered { attempts },
                Ok(Event::Failed {
                    job_id: id, error, ..
                }) if id == job_id => return WaitResult::Failed(error),
                Ok(Event::Cancelled { job_id: id, .. }) if id == job_id => {
                    return WaitResult::Cancelled;
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Collect events until `predicate` matches one (inclusive) or `timeout` elapses
pub async fn collect_events_until<F>(
    events: &mut tokio::sync::broadcast::Receiver<Event>,
    timeout: Duration,
    mut predicate: F,
) -> Vec<Event>
where
    F: FnMut(&Event) -> bool,
{
    let mut collected = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let done = predicate(&event);
            collected.push(event);
            if done {
                return;
            }
        }
    })
    .await;
    collected
}

/// Poll until no job is running or waiting
pub async fn wait_until_idle(courier: &Courier, timeout: Duration) {
    let idle = tokio::time::timeout(timeout, async {
        while !courier.status().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(idle.is_ok(), "courier still busy after {timeout:?}");
}

/// Assert that `dir` contains every file in `expected_files`
pub fn assert_files_exist(dir: &Path, expected_files: &[&str]) {
    for file in expected_files {
        let path = dir.join(file);
        assert!(path.exists(), "Expected file does not exist: {}", path.display());
    }
}
