//! Traits and boundary types for the fetcher, packager and transport

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FetchError, PackageError, TransportError};
use crate::types::{ContentId, Destination};

/// Packaged deliverable produced from fetched content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Path of the artifact file (inside the job's working directory)
    pub path: PathBuf,
    /// Size of the artifact in bytes
    pub size_bytes: u64,
}

impl Artifact {
    /// Build an artifact record from a file on disk
    pub async fn from_file(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let size_bytes = tokio::fs::metadata(&path).await?.len();
        Ok(Self { path, size_bytes })
    }
}

/// Successful upload acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Platform reference of the uploaded file, if the platform returns one
    pub file_id: Option<String>,
}

/// Retrieves raw content for a content id
///
/// # Errors
///
/// Implementations return [`FetchError::Partial`] when only some pages failed;
/// the courier retries those according to its fetch retry policy.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Download the content for `id` somewhere under `work_dir`
    ///
    /// `work_dir` exists and is owned exclusively by the calling job.
    /// Returns the directory holding the fetched pages.
    async fn fetch(&self, id: &ContentId, work_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// Converts a directory of pages into a single artifact
#[async_trait]
pub trait Packager: Send + Sync {
    /// Package `pages_dir` into one file written under `out_dir`
    async fn package(
        &self,
        id: &ContentId,
        pages_dir: &Path,
        out_dir: &Path,
    ) -> Result<Artifact, PackageError>;
}

/// Chat-platform client used for uploads and notifications
#[async_trait]
pub trait Transport: Send + Sync {
    /// Upload `file` to `destination`
    ///
    /// `timeout` is the adaptive deadline for this attempt; implementations may
    /// pass it to the platform API. The courier also enforces it locally.
    async fn send(
        &self,
        destination: &Destination,
        file: &Path,
        timeout: Duration,
    ) -> Result<Ack, TransportError>;

    /// Deliver a plain-text message to `destination`
    async fn notify(&self, destination: &Destination, text: &str) -> Result<(), TransportError>;
}
