//! Job records and caller-facing handles
//!
//! A [`Job`] is owned by exactly one place at a time: the admission queue
//! while it waits, then the worker running it. Every state change is
//! published through a `watch` channel that backs the caller's [`JobHandle`].

use crate::collaborators::Artifact;
use crate::types::{
    ContentId, Destination, JobId, JobInfo, JobState, JobTimings, Origin, Placement,
};
use crate::utils::safe_filename;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::watch;

/// Attempted lifecycle transition that the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job transition {from} -> {to}")]
pub struct InvalidTransition {
    /// State the job was in
    pub from: JobState,
    /// State that was requested
    pub to: JobState,
}

/// One submitted fetch-package-upload task
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) id: JobId,
    pub(crate) content_id: ContentId,
    pub(crate) origin: Origin,
    pub(crate) destination: Destination,
    state: JobState,
    submitted_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    /// Exclusively owned by this job until cleanup fires
    pub(crate) working_dir: PathBuf,
    pub(crate) artifact: Option<Artifact>,
    pub(crate) timings: JobTimings,
    pub(crate) warning: Option<String>,
    info_tx: watch::Sender<JobInfo>,
}

impl Job {
    /// Create a queued job and the receiver that will observe it
    pub(crate) fn new(
        id: JobId,
        content_id: ContentId,
        origin: Origin,
        work_root: &Path,
    ) -> (Self, watch::Receiver<JobInfo>) {
        let destination = origin.destination();
        let working_dir = working_dir_for(work_root, id, &content_id);
        let submitted_at = Utc::now();

        let info = JobInfo {
            job_id: id,
            content_id: content_id.clone(),
            destination: destination.clone(),
            state: JobState::Queued,
            submitted_at,
            started_at: None,
            finished_at: None,
        };
        let (info_tx, info_rx) = watch::channel(info);

        let job = Self {
            id,
            content_id,
            origin,
            destination,
            state: JobState::Queued,
            submitted_at,
            started_at: None,
            finished_at: None,
            working_dir,
            artifact: None,
            timings: JobTimings::default(),
            warning: None,
            info_tx,
        };
        (job, info_rx)
    }

    pub(crate) fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`, stamping timestamps and notifying observers
    pub(crate) fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        let now = Utc::now();
        if self.state == JobState::Queued && next.is_running() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.state = next;

        // Receivers may all be gone; the job still runs
        let _ = self.info_tx.send(self.info());
        Ok(())
    }

    pub(crate) fn info(&self) -> JobInfo {
        JobInfo {
            job_id: self.id,
            content_id: self.content_id.clone(),
            destination: self.destination.clone(),
            state: self.state,
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// `<work_root>/job-<job id>-<sanitised content id>`
pub(crate) fn working_dir_for(work_root: &Path, id: JobId, content_id: &ContentId) -> PathBuf {
    let safe_id = safe_filename(content_id.as_str(), "content");
    work_root.join(format!("job-{}-{}", id, safe_id))
}

/// Caller's view of a submitted job
///
/// # Examples
///
/// ```no_run
/// # use comic_courier::{Courier, ContentId, Origin};
/// # async fn example(courier: Courier) -> Result<(), Box<dyn std::error::Error>> {
/// let mut handle = courier.submit(ContentId::from("350234"), Origin::private("42")).await?;
/// println!("{} placed: {:?}", handle.content_id(), handle.placement());
///
/// let finished = handle.wait().await;
/// println!("finished as {}", finished.state);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: JobId,
    content_id: ContentId,
    placement: Placement,
    info_rx: watch::Receiver<JobInfo>,
}

impl JobHandle {
    pub(crate) fn new(
        job_id: JobId,
        content_id: ContentId,
        placement: Placement,
        info_rx: watch::Receiver<JobInfo>,
    ) -> Self {
        Self {
            job_id,
            content_id,
            placement,
            info_rx,
        }
    }

    /// Process-unique job id
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Content id the job was submitted for
    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    /// Where the job landed at submission
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        self.info_rx.borrow().state
    }

    /// Latest snapshot of the job record
    pub fn info(&self) -> JobInfo {
        self.info_rx.borrow().clone()
    }

    /// Wait until the job reaches a terminal state
    ///
    /// If the courier drops the job without finishing it (a panic in a
    /// collaborator, or shutdown), the last observed snapshot is returned.
    pub async fn wait(&mut self) -> JobInfo {
        let finished = match self.info_rx.wait_for(|info| info.state.is_terminal()).await {
            Ok(info) => Some(info.clone()),
            Err(_) => None,
        };
        finished.unwrap_or_else(|| self.info_rx.borrow().clone())
    }
}
