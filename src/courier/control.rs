//! Caller-facing control: submit, cancel and status.
//!
//! These only touch admission state under its lock and never await a
//! collaborator, so they return promptly even while every slot is busy.

use std::sync::atomic::Ordering;

use crate::error::{AdmissionError, CancelError};
use crate::job::{Job, JobHandle};
use crate::types::{CancelReceipt, ContentId, Event, JobId, JobState, Origin, QueueSnapshot};

use super::Courier;

impl Courier {
    /// Submit a fetch-and-deliver job for `content_id`
    ///
    /// The job starts at once when a slot is free, otherwise it waits in FIFO
    /// order. The returned handle reports the placement and can await the
    /// terminal state.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::Disabled`] when the feature switch is off
    /// - [`AdmissionError::ShuttingDown`] after [`shutdown`](Self::shutdown) started
    /// - [`AdmissionError::PermissionDenied`] for a group outside the allow-list
    /// - [`AdmissionError::DuplicateActive`] while the same id is queued or running
    /// - [`AdmissionError::QueueFull`] when every slot is busy and the queue is full
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use comic_courier::{Courier, ContentId, Origin, Placement};
    /// # async fn example(courier: Courier) -> Result<(), Box<dyn std::error::Error>> {
    /// let handle = courier
    ///     .submit(ContentId::from("350234"), Origin::group("1000", "42"))
    ///     .await?;
    /// if let Placement::Queued { ahead } = handle.placement() {
    ///     println!("{ahead} jobs ahead");
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(
        &self,
        content_id: ContentId,
        origin: Origin,
    ) -> Result<JobHandle, AdmissionError> {
        let mut admission = self.dispatch.admission.lock().await;

        if let Err(e) = admission.check(&content_id, &origin) {
            tracing::info!(content_id = %content_id, user = %origin.user, error = %e, "submission rejected");
            return Err(e);
        }

        let job_id = JobId(self.dispatch.next_job_id.fetch_add(1, Ordering::Relaxed));
        let (job, info_rx) = Job::new(
            job_id,
            content_id.clone(),
            origin,
            &self.config.cleanup.work_root,
        );

        let enqueued = admission.enqueue(job);
        if let Some(promoted) = enqueued.promoted {
            self.dispatch_job(promoted);
        }
        drop(admission);

        tracing::info!(
            job_id = job_id.0,
            content_id = %content_id,
            placement = ?enqueued.placement,
            "job submitted"
        );
        self.emit_event(Event::Queued {
            job_id,
            content_id: content_id.clone(),
            placement: enqueued.placement,
        });

        Ok(JobHandle::new(job_id, content_id, enqueued.placement, info_rx))
    }

    /// Remove a waiting job from the queue
    ///
    /// Only jobs that have not been promoted can be cancelled; a running job
    /// is left alone and finishes normally.
    ///
    /// # Errors
    ///
    /// - [`CancelError::NotCancellable`] when the job is already running
    /// - [`CancelError::NotFound`] when no job carries `content_id`
    pub async fn cancel(&self, content_id: &ContentId) -> Result<CancelReceipt, CancelError> {
        let (mut job, remaining_queued) = {
            let mut admission = self.dispatch.admission.lock().await;
            admission.remove_queued(content_id)?
        };

        self.mark_cancelled(&mut job);
        self.notify_cancelled(&job).await;

        Ok(CancelReceipt { remaining_queued })
    }

    /// Snapshot of running and waiting jobs
    pub async fn status(&self) -> QueueSnapshot {
        self.dispatch.admission.lock().await.snapshot()
    }

    /// Transition a job that never started to `Cancelled`
    pub(crate) fn mark_cancelled(&self, job: &mut Job) {
        if let Err(e) = job.transition(JobState::Cancelled) {
            tracing::error!(job_id = job.id.0, error = %e, "cannot cancel job");
            return;
        }
        tracing::info!(job_id = job.id.0, content_id = %job.content_id, "job cancelled");
        self.emit_event(Event::StateChanged {
            job_id: job.id,
            content_id: job.content_id.clone(),
            state: JobState::Cancelled,
        });
        self.emit_event(Event::Cancelled {
            job_id: job.id,
            content_id: job.content_id.clone(),
        });
    }

    /// Hand a promoted job to the worker pool
    ///
    /// Called with the admission lock held, so channel order is promotion order.
    pub(crate) fn dispatch_job(&self, job: Job) {
        if let Err(mpsc_err) = self.dispatch.job_tx.send(job) {
            // Every worker is gone; nothing will ever run this job
            let job = mpsc_err.0;
            tracing::error!(job_id = job.id.0, "worker pool stopped, dropping promoted job");
        }
    }
}
