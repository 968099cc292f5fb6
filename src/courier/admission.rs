//! Admission state: the FIFO waiting queue and the active set.
//!
//! Plain synchronous bookkeeping; the courier keeps one instance behind a
//! single `tokio::sync::Mutex` so that checks, queue mutations and dispatch
//! happen atomically.

use std::collections::VecDeque;

use crate::config::AdmissionConfig;
use crate::error::{AdmissionError, CancelError};
use crate::job::Job;
use crate::types::{ContentId, JobId, Origin, Placement, QueueSnapshot};

/// Entry of the active set
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveJob {
    id: JobId,
    content_id: ContentId,
}

/// Result of [`AdmissionController::enqueue`]
#[derive(Debug)]
pub(crate) struct Enqueued {
    pub(crate) placement: Placement,
    /// Job that must be dispatched to a worker now
    pub(crate) promoted: Option<Job>,
}

#[derive(Debug)]
pub(crate) struct AdmissionController {
    config: AdmissionConfig,
    queue: VecDeque<Job>,
    active: Vec<ActiveJob>,
    accepting: bool,
}

impl AdmissionController {
    pub(crate) fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            active: Vec::new(),
            accepting: true,
        }
    }

    /// Validate a submission without changing any state
    pub(crate) fn check(&self, content_id: &ContentId, origin: &Origin) -> Result<(), AdmissionError> {
        if !self.config.enabled {
            return Err(AdmissionError::Disabled);
        }
        if !self.accepting {
            return Err(AdmissionError::ShuttingDown);
        }
        if let Some(group) = &origin.group {
            if !self.config.is_group_allowed(group) {
                return Err(AdmissionError::PermissionDenied {
                    group: group.clone(),
                });
            }
        }
        if self.contains(content_id) {
            return Err(AdmissionError::DuplicateActive {
                id: content_id.clone(),
            });
        }
        if !self.has_free_slot() && self.queue.len() >= self.config.max_queue_len {
            return Err(AdmissionError::QueueFull {
                limit: self.config.max_queue_len,
                queued: self.queue.len(),
            });
        }
        Ok(())
    }

    /// Append a checked job and promote it straight away if a slot is free
    pub(crate) fn enqueue(&mut self, job: Job) -> Enqueued {
        let id = job.id;
        self.queue.push_back(job);
        let promoted = self.promote_next();

        let placement = match &promoted {
            Some(job) if job.id == id => Placement::Started,
            _ => Placement::Queued {
                ahead: self.queue.len().saturating_sub(1),
            },
        };
        Enqueued { placement, promoted }
    }

    /// Free the slot held by `id` and promote the next waiting job
    ///
    /// Completing a job that no longer holds a slot does nothing.
    pub(crate) fn complete(&mut self, id: JobId) -> Option<Job> {
        let before = self.active.len();
        self.active.retain(|a| a.id != id);
        if self.active.len() == before {
            return None;
        }
        self.promote_next()
    }

    /// Remove a waiting job
    ///
    /// Returns the job and the number of jobs still waiting.
    pub(crate) fn remove_queued(&mut self, content_id: &ContentId) -> Result<(Job, usize), CancelError> {
        if self.active.iter().any(|a| &a.content_id == content_id) {
            return Err(CancelError::NotCancellable {
                id: content_id.clone(),
            });
        }
        let position = self
            .queue
            .iter()
            .position(|job| &job.content_id == content_id)
            .ok_or_else(|| CancelError::NotFound {
                id: content_id.clone(),
            })?;

        match self.queue.remove(position) {
            Some(job) => Ok((job, self.queue.len())),
            None => Err(CancelError::NotFound {
                id: content_id.clone(),
            }),
        }
    }

    /// Stop accepting submissions and hand back every waiting job
    pub(crate) fn close(&mut self) -> Vec<Job> {
        self.accepting = false;
        self.queue.drain(..).collect()
    }

    pub(crate) fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            active: self.active.iter().map(|a| a.content_id.clone()).collect(),
            queued: self.queue.iter().map(|job| job.content_id.clone()).collect(),
            max_concurrent: self.config.max_concurrent,
        }
    }

    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }

    fn contains(&self, content_id: &ContentId) -> bool {
        self.active.iter().any(|a| &a.content_id == content_id)
            || self.queue.iter().any(|job| &job.content_id == content_id)
    }

    fn has_free_slot(&self) -> bool {
        self.active.len() < self.config.max_concurrent
    }

    fn promote_next(&mut self) -> Option<Job> {
        if !self.has_free_slot() {
            return None;
        }
        let job = self.queue.pop_front()?;
        self.active.push(ActiveJob {
            id: job.id,
            content_id: job.content_id.clone(),
        });
        Some(job)
    }
}
