//! Deferred working-directory cleanup
//!
//! Each job's working directory is kept for a while after the job finishes
//! (so the platform can finish reading the uploaded file) and then removed.
//! Every deletion is an explicit, cancellable timer keyed by [`JobId`]; timers
//! run on their own tasks and never occupy a worker slot.

use crate::types::{Event, JobId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Armed deletion for one job
struct CleanupTimer {
    dir: PathBuf,
    token: CancellationToken,
    generation: u64,
}

/// Schedules one-shot deletion of job working directories
#[derive(Clone)]
pub struct CleanupScheduler {
    timers: Arc<Mutex<HashMap<JobId, CleanupTimer>>>,
    next_generation: Arc<AtomicU64>,
    event_tx: broadcast::Sender<Event>,
}

impl CleanupScheduler {
    /// Create a scheduler that reports deletions on `event_tx`
    pub fn new(event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            event_tx,
        }
    }

    /// Arm deletion of `dir` after `delay`
    ///
    /// A timer already armed for `job_id` is replaced.
    pub async fn schedule(&self, job_id: JobId, dir: PathBuf, delay: Duration) {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let previous = {
            let mut timers = self.timers.lock().await;
            timers.insert(
                job_id,
                CleanupTimer {
                    dir: dir.clone(),
                    token: token.clone(),
                    generation,
                },
            )
        };
        if let Some(previous) = previous {
            debug!(job_id = job_id.0, "replacing armed cleanup timer");
            previous.token.cancel();
        }

        debug!(job_id = job_id.0, ?dir, delay_secs = delay.as_secs(), "cleanup scheduled");

        let timers = Arc::clone(&self.timers);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(job_id = job_id.0, "cleanup timer disarmed");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            {
                let mut timers = timers.lock().await;
                match timers.get(&job_id) {
                    Some(timer) if timer.generation == generation => {
                        timers.remove(&job_id);
                    }
                    // Replaced or cancelled while we were waking up
                    _ => return,
                }
            }

            delete_and_report(job_id, &dir, &event_tx).await;
        });
    }

    /// Disarm the pending deletion for `job_id`
    ///
    /// Returns false when nothing was armed (never scheduled, or already fired).
    pub async fn cancel(&self, job_id: JobId) -> bool {
        let removed = self.timers.lock().await.remove(&job_id);
        match removed {
            Some(timer) => {
                timer.token.cancel();
                debug!(job_id = job_id.0, dir = ?timer.dir, "cleanup cancelled");
                true
            }
            None => false,
        }
    }

    /// Disarm every pending deletion, leaving the directories in place
    pub async fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.timers.lock().await.drain().collect();
        for (_, timer) in &drained {
            timer.token.cancel();
        }
        drained.len()
    }

    /// Delete every pending directory now instead of waiting for its timer
    pub async fn flush(&self) -> usize {
        let drained: Vec<_> = self.timers.lock().await.drain().collect();
        let count = drained.len();
        for (job_id, timer) in drained {
            timer.token.cancel();
            delete_and_report(job_id, &timer.dir, &self.event_tx).await;
        }
        if count > 0 {
            info!(count, "flushed pending cleanups");
        }
        count
    }

    /// Number of armed timers
    pub async fn pending(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Whether a deletion is armed for `job_id`
    pub async fn is_pending(&self, job_id: JobId) -> bool {
        self.timers.lock().await.contains_key(&job_id)
    }
}

async fn delete_and_report(job_id: JobId, dir: &Path, event_tx: &broadcast::Sender<Event>) {
    match remove_working_dir(dir).await {
        Ok(true) => {
            info!(job_id = job_id.0, ?dir, "working directory removed");
            event_tx
                .send(Event::CleanedUp {
                    job_id,
                    path: dir.to_path_buf(),
                })
                .ok();
        }
        Ok(false) => {
            debug!(job_id = job_id.0, ?dir, "working directory already gone");
        }
        Err(e) => {
            warn!(job_id = job_id.0, ?dir, error = %e, "failed to remove working directory");
        }
    }
}

/// Remove a directory tree; a missing directory is not an error
///
/// Returns whether anything was removed.
pub(crate) async fn remove_working_dir(dir: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
