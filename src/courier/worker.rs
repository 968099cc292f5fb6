//! Fixed worker pool.
//!
//! `max_concurrent` workers share the receiving end of the dispatch channel.
//! Each runs one job to completion and goes back to waiting. The job frees
//! its own slot before publishing its terminal state, which may promote the
//! next job onto the channel.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::job::Job;
use crate::types::JobId;

use super::Courier;

impl Courier {
    /// Spawn the worker tasks
    pub(crate) async fn start_workers(&self, job_rx: mpsc::UnboundedReceiver<Job>) {
        let job_rx = Arc::new(Mutex::new(job_rx));
        let count = self.config.admission.max_concurrent;

        let mut workers = self.dispatch.workers.lock().await;
        for worker_id in 0..count {
            let courier = self.clone();
            let job_rx = Arc::clone(&job_rx);
            workers.push(tokio::spawn(async move {
                courier.worker_loop(worker_id, job_rx).await;
            }));
        }
        tracing::debug!(count, "worker pool started");
    }

    async fn worker_loop(&self, worker_id: usize, job_rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>) {
        loop {
            let next = tokio::select! {
                _ = self.dispatch.stop.cancelled() => None,
                job = async { job_rx.lock().await.recv().await } => job,
            };
            let Some(job) = next else {
                break;
            };

            let job_id = job.id;
            tracing::debug!(worker_id, job_id = job_id.0, "worker picked up job");

            // A panicking collaborator must not leak the slot; a job that
            // finished normally has already released it
            let courier = self.clone();
            if let Err(e) = tokio::spawn(async move { courier.run_job(job).await }).await {
                tracing::error!(worker_id, job_id = job_id.0, error = %e, "job task aborted");
                self.complete(job_id).await;
            }
        }
        tracing::debug!(worker_id, "worker stopped");
    }

    /// Free the slot held by `job_id` and dispatch the next waiting job
    pub(crate) async fn complete(&self, job_id: JobId) {
        let mut admission = self.dispatch.admission.lock().await;
        if let Some(next) = admission.complete(job_id) {
            tracing::debug!(
                job_id = next.id.0,
                content_id = %next.content_id,
                "promoting queued job"
            );
            self.dispatch_job(next);
        }
    }
}
