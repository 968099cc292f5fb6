//! Per-job pipeline: fetch, package, upload, then finalization.
//!
//! Finalization always runs exactly once per job: one user notification,
//! the deferred cleanup timer (when a working directory exists), release of
//! the job's slot and, last, the terminal transition and its events.

use std::path::PathBuf;
use std::time::Instant;

use crate::error::Error;
use crate::job::Job;
use crate::retry::with_retry;
use crate::types::{Event, JobState};
use crate::upload::UploadReport;
use crate::utils::redact_error_text;

use super::Courier;

/// Shown to users when redaction leaves nothing of an error message
const REDACTED_FALLBACK: &str = "unexpected error";

/// Why and where a job stopped
#[derive(Debug)]
struct StageFailure {
    stage: JobState,
    error: Error,
}

impl StageFailure {
    fn new(stage: JobState, error: impl Into<Error>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

impl Courier {
    /// Drive one promoted job to a terminal state
    pub(crate) async fn run_job(&self, mut job: Job) {
        tracing::info!(
            job_id = job.id.0,
            content_id = %job.content_id,
            user = %job.origin.user,
            destination = %job.destination,
            "job started"
        );

        match self.execute(&mut job).await {
            Ok(report) => self.finish_delivered(&mut job, report).await,
            Err(failure) => self.finish_failed(&mut job, failure).await,
        }
    }

    async fn execute(&self, job: &mut Job) -> Result<UploadReport, StageFailure> {
        // Fetching
        self.advance(job, JobState::Fetching)?;
        let started = Instant::now();
        tokio::fs::create_dir_all(&job.working_dir)
            .await
            .map_err(|e| StageFailure::new(JobState::Fetching, e))?;

        let fetched = {
            let fetcher = &self.collaborators.fetcher;
            let content_id = &job.content_id;
            let work_dir = &job.working_dir;
            with_retry(&self.config.fetch_retry, || fetcher.fetch(content_id, work_dir)).await
        };
        job.timings.fetch = Some(started.elapsed());
        let pages_dir: PathBuf = fetched.map_err(|e| StageFailure::new(JobState::Fetching, e))?;
        tracing::debug!(job_id = job.id.0, ?pages_dir, "content fetched");

        // Packaging
        self.advance(job, JobState::Packaging)?;
        let started = Instant::now();
        let packaged = self
            .collaborators
            .packager
            .package(&job.content_id, &pages_dir, &job.working_dir)
            .await;
        job.timings.package = Some(started.elapsed());
        let artifact = packaged.map_err(|e| StageFailure::new(JobState::Packaging, e))?;
        tracing::debug!(
            job_id = job.id.0,
            artifact = ?artifact.path,
            size_bytes = artifact.size_bytes,
            "artifact packaged"
        );
        job.artifact = Some(artifact.clone());

        // Uploading
        self.advance(job, JobState::Uploading)?;
        let started = Instant::now();
        let uploaded = self
            .uploader
            .upload(
                self.collaborators.transport.as_ref(),
                job.id,
                &job.content_id,
                &job.destination,
                &artifact,
            )
            .await;
        job.timings.upload = Some(started.elapsed());
        uploaded.map_err(|e| StageFailure::new(JobState::Uploading, e))
    }

    /// Move a running job forward and publish the change
    fn advance(&self, job: &mut Job, next: JobState) -> Result<(), StageFailure> {
        let stage = job.state();
        job.transition(next)
            .map_err(|e| StageFailure::new(stage, e))?;

        tracing::info!(job_id = job.id.0, content_id = %job.content_id, state = %next, "job state changed");
        self.emit_event(Event::StateChanged {
            job_id: job.id,
            content_id: job.content_id.clone(),
            state: next,
        });
        Ok(())
    }

    async fn finish_delivered(&self, job: &mut Job, report: UploadReport) {
        job.warning = report.warning.clone();

        let mut text = format!("{} delivered as {}", job.content_id, report.file_name);
        if let Some(warning) = &job.warning {
            text.push_str(&format!("\nwarning: {}", warning));
        }

        let event = Event::Delivered {
            job_id: job.id,
            content_id: job.content_id.clone(),
            artifact: job
                .artifact
                .as_ref()
                .map(|a| a.path.clone())
                .unwrap_or_default(),
            attempts: report.attempts,
            warning: job.warning.clone(),
            timings: job.timings.clone(),
        };

        if self.finalize(job, JobState::Delivered, text, event).await {
            tracing::info!(
                job_id = job.id.0,
                content_id = %job.content_id,
                attempts = report.attempts,
                file_name = %report.file_name,
                "job delivered"
            );
        }
    }

    async fn finish_failed(&self, job: &mut Job, failure: StageFailure) {
        let StageFailure { stage, error } = failure;
        let reason = redact_error_text(&error.to_string(), &self.redaction_roots, REDACTED_FALLBACK);

        let text = format!("{} failed while {}: {}", job.content_id, stage, reason);
        let event = Event::Failed {
            job_id: job.id,
            content_id: job.content_id.clone(),
            stage,
            error: reason,
        };

        if self.finalize(job, JobState::Failed, text, event).await {
            tracing::error!(
                job_id = job.id.0,
                content_id = %job.content_id,
                stage = %stage,
                error = %error,
                "job failed"
            );
        }
    }

    /// Notify, arm cleanup, free the slot, then publish the terminal state
    ///
    /// Anyone woken by the terminal state (a `JobHandle::wait`, an event
    /// subscriber) already sees the slot free, the notification sent and
    /// the cleanup timer armed. Returns false if `terminal` is not reachable
    /// from the job's current state.
    async fn finalize(&self, job: &mut Job, terminal: JobState, text: String, event: Event) -> bool {
        if !job.state().can_transition_to(terminal) {
            tracing::error!(
                job_id = job.id.0,
                from = %job.state(),
                to = %terminal,
                "cannot finish job"
            );
            self.complete(job.id).await;
            return false;
        }

        self.notify(job, text).await;

        // Disk is reclaimed on every outcome, failures included
        if tokio::fs::try_exists(&job.working_dir).await.unwrap_or(true) {
            self.cleanup
                .schedule(job.id, job.working_dir.clone(), self.config.cleanup.delay)
                .await;
        }

        self.complete(job.id).await;

        if let Err(e) = job.transition(terminal) {
            tracing::error!(job_id = job.id.0, error = %e, "cannot finish job");
            return false;
        }
        self.emit_event(Event::StateChanged {
            job_id: job.id,
            content_id: job.content_id.clone(),
            state: terminal,
        });
        self.emit_event(event);
        true
    }

    /// Tell the submitter that their queued job was removed
    pub(crate) async fn notify_cancelled(&self, job: &Job) {
        let text = format!("{} was removed from the queue", job.content_id);
        self.notify(job, text).await;
    }

    /// Send the job's single user notification; failures are only logged
    async fn notify(&self, job: &Job, mut text: String) {
        if self.config.notifications.include_timings {
            if let Some(summary) = job.timings.summary() {
                text.push('\n');
                text.push_str(&summary);
            }
        }

        if let Err(e) = self
            .collaborators
            .transport
            .notify(&job.destination, &text)
            .await
        {
            tracing::warn!(
                job_id = job.id.0,
                destination = %job.destination,
                error = %e,
                "failed to deliver notification"
            );
            self.emit_event(Event::NotifyFailed {
                job_id: job.id,
                error: e.to_string(),
            });
        }
    }
}
