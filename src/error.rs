//! Error types for comic-courier
//!
//! This module provides the error taxonomy for the library:
//! - Admission and cancellation errors returned synchronously to callers
//! - Collaborator errors (fetch, package, transport) at the trait boundary
//! - Upload errors produced by the retrying upload executor
//! - The crate-level [`Error`] that wraps all of the above

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::job::InvalidTransition;
use crate::types::ContentId;

/// Result type alias for comic-courier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for comic-courier
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent")
        key: Option<String>,
    },

    /// Submission was rejected
    #[error("admission error: {0}")]
    Admission(#[from] AdmissionError),

    /// Cancellation was rejected
    #[error("cancel error: {0}")]
    Cancel(#[from] CancelError),

    /// Content fetch failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Packaging failed
    #[error("package error: {0}")]
    Package(#[from] PackageError),

    /// Upload failed after classification and retries
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A job was driven through an illegal lifecycle transition
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

/// Reasons a submission is refused before a job is created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The feature switch is off
    #[error("downloads are disabled")]
    Disabled,

    /// The courier is shutting down and no longer accepts jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// The origin group is not in the allow-list
    #[error("group {group} is not allowed to submit jobs")]
    PermissionDenied {
        /// The group that was refused
        group: String,
    },

    /// A job with the same content id is already queued or running
    #[error("{id} is already queued or running")]
    DuplicateActive {
        /// The duplicated content id
        id: ContentId,
    },

    /// The waiting queue is at capacity
    #[error("queue is full ({queued}/{limit} waiting)")]
    QueueFull {
        /// Configured queue capacity
        limit: usize,
        /// Jobs currently waiting
        queued: usize,
    },
}

/// Reasons a cancellation is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    /// No queued or running job carries this content id
    #[error("{id} is not in the waiting queue")]
    NotFound {
        /// The content id that was not found
        id: ContentId,
    },

    /// The job has already been promoted and cannot be interrupted
    #[error("{id} is already running and cannot be cancelled")]
    NotCancellable {
        /// The content id of the running job
        id: ContentId,
    },
}

/// Errors reported by a [`ContentFetcher`](crate::collaborators::ContentFetcher)
#[derive(Debug, Error)]
pub enum FetchError {
    /// Some pages failed to download; the whole fetch may succeed on retry
    #[error("partial download failure: {0}")]
    Partial(String),

    /// The content id does not exist upstream
    #[error("content {0} not found")]
    NotFound(ContentId),

    /// Any other fetcher failure
    #[error("{0}")]
    Failed(String),

    /// I/O error while writing fetched content
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`Packager`](crate::collaborators::Packager)
#[derive(Debug, Error)]
pub enum PackageError {
    /// The fetched directory held nothing to package
    #[error("no pages found in {0}")]
    Empty(PathBuf),

    /// Any other packager failure
    #[error("{0}")]
    Failed(String),

    /// I/O error while writing the artifact
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error payload returned by a [`Transport`](crate::collaborators::Transport)
///
/// Carries the platform return code when the platform reported one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}{}", .retcode.map(|c| format!(" (retcode={c})")).unwrap_or_default())]
pub struct TransportError {
    /// Platform return code, if any
    pub retcode: Option<i64>,
    /// Platform failure message
    pub message: String,
}

impl TransportError {
    /// Create a transport error with a return code
    pub fn with_code(retcode: i64, message: impl Into<String>) -> Self {
        Self {
            retcode: Some(retcode),
            message: message.into(),
        }
    }

    /// Create a transport error without a return code
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            retcode: None,
            message: message.into(),
        }
    }
}

/// Terminal outcome of the retrying upload executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// Risk-control failures persisted through every allowed attempt
    #[error("upload still rejected after {attempts} attempts: {last}")]
    TransientExhausted {
        /// Attempts made
        attempts: u32,
        /// The last transport error observed
        last: TransportError,
    },

    /// Every allowed attempt timed out; the file may still arrive
    #[error("upload timed out after {attempts} attempts (timeout {}s); it may still complete", .timeout.as_secs())]
    SlowUpload {
        /// Attempts made
        attempts: u32,
        /// Timeout applied to each attempt
        timeout: Duration,
    },

    /// Non-transient failure, not retried
    #[error("upload failed: {source}")]
    Fatal {
        /// The transport error that ended the upload
        source: TransportError,
    },
}
