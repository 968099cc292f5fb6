//! Shutdown coordination.

use std::time::Duration;

use crate::error::Result;
use crate::types::Event;

use super::Courier;

impl Courier {
    /// Gracefully shut down the courier
    ///
    /// 1. Stops accepting submissions and cancels every waiting job
    /// 2. Waits up to `shutdown_timeout` for running jobs to finish
    /// 3. Stops the worker pool
    /// 4. Deletes pending working directories now (`purge_on_shutdown`) or
    ///    disarms their timers and leaves them on disk
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Running jobs are never interrupted; if they outlive the timeout they
    /// keep running in the background and shutdown proceeds without them.
    ///
    /// # Errors
    ///
    /// Currently always succeeds; the `Result` is kept so callers can use `?`
    /// alongside [`run_with_shutdown`](crate::run_with_shutdown).
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting and drop the waiting queue
        let drained = self.dispatch.admission.lock().await.close();
        tracing::info!(cancelled = drained.len(), "Stopped accepting new jobs");
        for mut job in drained {
            self.mark_cancelled(&mut job);
            self.notify_cancelled(&job).await;
        }

        // 2. Wait for running jobs
        let shutdown_timeout = self.config.shutdown_timeout;
        match tokio::time::timeout(shutdown_timeout, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running jobs finished"),
            Err(_) => tracing::warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Timeout waiting for running jobs, proceeding with shutdown"
            ),
        }

        // 3. Stop idle workers
        self.dispatch.stop.cancel();

        // 4. Working directories
        if self.config.cleanup.purge_on_shutdown {
            let flushed = self.cleanup.flush().await;
            tracing::info!(flushed, "Removed pending working directories");
        } else {
            let disarmed = self.cleanup.cancel_all().await;
            tracing::info!(disarmed, "Left pending working directories on disk");
        }

        // 5. Done
        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Poll until the active set is empty
    async fn wait_for_active_jobs(&self) {
        loop {
            let active_count = self.dispatch.admission.lock().await.active_len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for running jobs to finish");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Wait for every worker task to exit
    ///
    /// Only meaningful after [`shutdown`](Self::shutdown); returns once idle
    /// workers have observed the stop signal.
    pub async fn join_workers(&self) {
        let handles: Vec<_> = self.dispatch.workers.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "worker task ended abnormally");
            }
        }
    }
}
