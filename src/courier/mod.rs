//! Courier implementation split into focused submodules.
//!
//! The [`Courier`] struct and its methods are organized by concern:
//! - [`admission`] - Waiting queue and active set bookkeeping
//! - [`control`] - Submit, cancel and status
//! - [`worker`] - Fixed worker pool fed by the dispatch channel
//! - [`job_task`] - Fetch, package, upload and finalization of one job
//! - [`lifecycle`] - Graceful shutdown

mod admission;
mod control;
mod job_task;
mod lifecycle;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cleanup::CleanupScheduler;
use crate::collaborators::{ContentFetcher, Packager, Transport};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::job::Job;
use crate::types::Event;
use crate::upload::RetryUploader;
use crate::utils::redaction_roots;

use admission::AdmissionController;

/// The three external collaborators
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub(crate) fetcher: Arc<dyn ContentFetcher>,
    pub(crate) packager: Arc<dyn Packager>,
    pub(crate) transport: Arc<dyn Transport>,
}

/// Dispatch plumbing between admission and the worker pool
#[derive(Clone)]
pub(crate) struct Dispatch {
    /// Admission state (protected by one Mutex; sends to `job_tx` happen under it)
    pub(crate) admission: Arc<Mutex<AdmissionController>>,
    /// Promoted jobs, in promotion order
    pub(crate) job_tx: mpsc::UnboundedSender<Job>,
    /// Worker task handles, joined on shutdown
    pub(crate) workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    /// Stops idle workers once shutdown has drained the active set
    pub(crate) stop: CancellationToken,
    /// Next job id
    pub(crate) next_job_id: Arc<AtomicU64>,
}

/// Bounded-concurrency fetch, package and deliver orchestrator (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Courier {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    pub(crate) collaborators: Collaborators,
    pub(crate) dispatch: Dispatch,
    pub(crate) uploader: RetryUploader,
    pub(crate) cleanup: CleanupScheduler,
    /// Paths stripped from user-facing error text
    pub(crate) redaction_roots: Arc<Vec<PathBuf>>,
}

impl Courier {
    /// Create a courier and start its worker pool
    ///
    /// Validates `config`, creates the work root and spawns
    /// `admission.max_concurrent` workers. Must be called inside a tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid configuration and
    /// [`Error::Io`] when the work root cannot be created.
    pub async fn new(
        config: Config,
        fetcher: Arc<dyn ContentFetcher>,
        packager: Arc<dyn Packager>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.cleanup.work_root)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create work root '{}': {}",
                        config.cleanup.work_root.display(),
                        e
                    ),
                ))
            })?;

        // Buffer enough events for slow subscribers; laggards get RecvError::Lagged
        let (event_tx, _rx) = broadcast::channel(1000);
        let (job_tx, job_rx) = mpsc::unbounded_channel();

        let dispatch = Dispatch {
            admission: Arc::new(Mutex::new(AdmissionController::new(config.admission.clone()))),
            job_tx,
            workers: Arc::new(Mutex::new(Vec::new())),
            stop: CancellationToken::new(),
            next_job_id: Arc::new(AtomicU64::new(1)),
        };

        let courier = Self {
            uploader: RetryUploader::new(&config.upload, event_tx.clone()),
            cleanup: CleanupScheduler::new(event_tx.clone()),
            redaction_roots: Arc::new(redaction_roots(&config.cleanup.work_root)),
            event_tx,
            config: Arc::new(config),
            collaborators: Collaborators {
                fetcher,
                packager,
                transport,
            },
            dispatch,
        };

        courier.start_workers(job_rx).await;

        tracing::info!(
            max_concurrent = courier.config.admission.max_concurrent,
            max_queue_len = courier.config.admission.max_queue_len,
            work_root = %courier.config.cleanup.work_root.display(),
            "courier started"
        );

        Ok(courier)
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives every event independently. A subscriber that
    /// falls more than 1000 events behind receives `RecvError::Lagged`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use comic_courier::Courier;
    /// # async fn example(courier: Courier) {
    /// let mut events = courier.subscribe();
    /// tokio::spawn(async move {
    ///     while let Ok(event) = events.recv().await {
    ///         tracing::info!(?event, "courier event");
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the configuration the courier was built with
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Number of working directories waiting for deferred deletion
    pub async fn pending_cleanups(&self) -> usize {
        self.cleanup.pending().await
    }

    /// Emit an event to all subscribers
    ///
    /// With no subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
