//! Core types for comic-courier

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// External content identifier (album/book id)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    /// Create a new ContentId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ContentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-unique identifier of one submitted job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who submitted a job
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Group the request came from (None for private chats)
    pub group: Option<String>,
    /// User who sent the request
    pub user: String,
}

impl Origin {
    /// Request sent inside a group chat
    pub fn group(group: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            group: Some(group.into()),
            user: user.into(),
        }
    }

    /// Request sent in a private chat
    pub fn private(user: impl Into<String>) -> Self {
        Self {
            group: None,
            user: user.into(),
        }
    }

    /// Where results for this origin are delivered
    pub fn destination(&self) -> Destination {
        match &self.group {
            Some(group) => Destination::Group(group.clone()),
            None => Destination::Private(self.user.clone()),
        }
    }
}

/// Delivery target on the transport
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Destination {
    /// A group chat
    Group(String),
    /// A private chat with a user
    Private(String),
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Group(id) => write!(f, "group {}", id),
            Destination::Private(id) => write!(f, "user {}", id),
        }
    }
}

/// Job lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for a free slot
    Queued,
    /// Fetcher is retrieving content
    Fetching,
    /// Packager is building the artifact
    Packaging,
    /// Artifact is being uploaded
    Uploading,
    /// Artifact delivered (terminal)
    Delivered,
    /// Pipeline failed (terminal)
    Failed,
    /// Removed from the queue before it started (terminal)
    Cancelled,
}

impl JobState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Delivered | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether the job occupies a concurrency slot in this state
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            JobState::Fetching | JobState::Packaging | JobState::Uploading
        )
    }

    /// Whether `self -> next` is a legal lifecycle transition
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Fetching)
                | (Queued, Cancelled)
                | (Fetching, Packaging)
                | (Packaging, Uploading)
                | (Uploading, Delivered)
                | (Fetching, Failed)
                | (Packaging, Failed)
                | (Uploading, Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Fetching => "fetching",
            JobState::Packaging => "packaging",
            JobState::Uploading => "uploading",
            JobState::Delivered => "delivered",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Where a freshly submitted job landed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Placement {
    /// Promoted immediately into a free slot
    Started,
    /// Waiting behind `ahead` other jobs
    Queued {
        /// Jobs waiting before this one
        ahead: usize,
    },
}

/// Per-phase wall-clock durations of one job
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JobTimings {
    /// Time spent in the fetcher (including fetch retries)
    pub fetch: Option<Duration>,
    /// Time spent in the packager
    pub package: Option<Duration>,
    /// Time spent uploading (including upload retries)
    pub upload: Option<Duration>,
}

impl JobTimings {
    /// Render as a short single-line summary, or None when nothing was timed
    pub fn summary(&self) -> Option<String> {
        let parts: Vec<String> = [
            ("fetch", self.fetch),
            ("package", self.package),
            ("upload", self.upload),
        ]
        .into_iter()
        .filter_map(|(label, d)| d.map(|d| format!("{}: {:.2}s", label, d.as_secs_f64())))
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(format!("timings | {}", parts.join(", ")))
        }
    }
}

/// Read-only view of the admission queue
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Running jobs, in promotion order
    pub active: Vec<ContentId>,
    /// Waiting jobs, in arrival order
    pub queued: Vec<ContentId>,
    /// Configured concurrency bound
    pub max_concurrent: usize,
}

impl QueueSnapshot {
    /// Whether nothing is running or waiting
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.queued.is_empty()
    }
}

/// Result of a successful cancellation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReceipt {
    /// Jobs still waiting after the removal
    pub remaining_queued: usize,
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted into the queue
    Queued {
        /// Job ID
        job_id: JobId,
        /// Content ID
        content_id: ContentId,
        /// Where it landed
        placement: Placement,
    },

    /// Job moved to a new lifecycle state
    StateChanged {
        /// Job ID
        job_id: JobId,
        /// Content ID
        content_id: ContentId,
        /// New state
        state: JobState,
    },

    /// Upload attempt is being retried
    UploadRetry {
        /// Job ID
        job_id: JobId,
        /// Attempt that just failed (1-based)
        attempt: u32,
        /// Reason for the retry
        reason: String,
    },

    /// Upload exceeded its timeout; it may still succeed server-side
    SlowUpload {
        /// Job ID
        job_id: JobId,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Artifact delivered
    Delivered {
        /// Job ID
        job_id: JobId,
        /// Content ID
        content_id: ContentId,
        /// Artifact that was sent
        artifact: PathBuf,
        /// Upload attempts used
        attempts: u32,
        /// Warning attached to the delivery, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
        /// Per-phase timings
        timings: JobTimings,
    },

    /// Job failed
    Failed {
        /// Job ID
        job_id: JobId,
        /// Content ID
        content_id: ContentId,
        /// Stage the failure happened in
        stage: JobState,
        /// Error message
        error: String,
    },

    /// Queued job was cancelled
    Cancelled {
        /// Job ID
        job_id: JobId,
        /// Content ID
        content_id: ContentId,
    },

    /// Working directory removed
    CleanedUp {
        /// Job ID
        job_id: JobId,
        /// Directory that was removed
        path: PathBuf,
    },

    /// User notification could not be delivered
    NotifyFailed {
        /// Job ID
        job_id: JobId,
        /// Error message
        error: String,
    },

    /// Courier shut down
    Shutdown,
}

/// Point-in-time view of one job's record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobInfo {
    /// Job ID
    pub job_id: JobId,
    /// Content ID
    pub content_id: ContentId,
    /// Delivery target
    pub destination: Destination,
    /// Current state
    pub state: JobState,
    /// When the job was submitted
    pub submitted_at: DateTime<Utc>,
    /// When the job was promoted
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}
