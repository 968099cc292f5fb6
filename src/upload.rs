//! Retrying upload executor
//!
//! Wraps [`Transport::send`] with failure classification:
//!
//! - **risk-control** rejections (configured return codes or message
//!   fragments) are retried with linear backoff, optionally under a simplified
//!   file name
//! - **timeouts** (the local deadline elapsed, or the platform reported an
//!   upload timeout) raise [`Event::SlowUpload`] and get a limited number of
//!   extra attempts
//! - anything else is fatal and returned immediately
//!
//! The per-attempt deadline comes from [`UploadTimeouts`].

use crate::collaborators::{Artifact, Transport};
use crate::config::UploadConfig;
use crate::error::{TransportError, UploadError};
use crate::timeout::UploadTimeouts;
use crate::types::{ContentId, Destination, Event, JobId};
use crate::utils::fallback_file_name;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};

/// Outcome of a successful upload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReport {
    /// Attempts used, the successful one included
    pub attempts: u32,
    /// User-visible warning (renamed file, slow upload)
    pub warning: Option<String>,
    /// File name that was finally uploaded
    pub file_name: String,
}

/// How a failed attempt is handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FailureKind {
    /// Platform anti-abuse rejection, expected to pass on retry
    RiskControl,
    /// Deadline elapsed; the file may still arrive
    Timeout,
    /// Not retried
    Fatal,
}

/// Upload executor shared by all workers
#[derive(Clone)]
pub struct RetryUploader {
    config: Arc<UploadConfig>,
    timeouts: UploadTimeouts,
    /// Present when uploads are serialized across workers
    upload_lock: Option<Arc<Mutex<()>>>,
    event_tx: broadcast::Sender<Event>,
}

impl RetryUploader {
    /// Create an executor from the upload settings
    pub fn new(config: &UploadConfig, event_tx: broadcast::Sender<Event>) -> Self {
        Self {
            config: Arc::new(config.clone()),
            timeouts: UploadTimeouts::from_config(config),
            upload_lock: config
                .serialize_uploads
                .then(|| Arc::new(Mutex::new(()))),
            event_tx,
        }
    }

    /// Upload `artifact` to `destination`, retrying transient failures
    ///
    /// `content_id` names the simplified fallback file used after a
    /// risk-control rejection.
    ///
    /// # Errors
    ///
    /// - [`UploadError::Fatal`] on the first non-transient failure
    /// - [`UploadError::TransientExhausted`] when risk-control rejections use up
    ///   every attempt
    /// - [`UploadError::SlowUpload`] when timeouts use up the timeout allowance
    pub async fn upload(
        &self,
        transport: &dyn Transport,
        job_id: JobId,
        content_id: &ContentId,
        destination: &Destination,
        artifact: &Artifact,
    ) -> Result<UploadReport, UploadError> {
        let _serialized = match &self.upload_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let timeout = self.timeouts.estimate(artifact.size_bytes);
        tracing::info!(
            job_id = job_id.0,
            %destination,
            size_bytes = artifact.size_bytes,
            timeout_secs = timeout.as_secs_f64(),
            "starting upload"
        );

        let mut renamed: Option<PathBuf> = None;
        let result = self
            .upload_attempts(
                transport,
                job_id,
                content_id,
                destination,
                artifact,
                timeout,
                &mut renamed,
            )
            .await;

        if let Some(copy) = renamed {
            if let Err(e) = tokio::fs::remove_file(&copy).await {
                tracing::debug!(job_id = job_id.0, ?copy, error = %e, "failed to remove renamed copy");
            }
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_attempts(
        &self,
        transport: &dyn Transport,
        job_id: JobId,
        content_id: &ContentId,
        destination: &Destination,
        artifact: &Artifact,
        timeout: Duration,
        renamed: &mut Option<PathBuf>,
    ) -> Result<UploadReport, UploadError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0u32;
        let mut timeouts_seen = 0u32;

        loop {
            attempts += 1;
            let path = renamed.as_deref().unwrap_or(&artifact.path);

            let (kind, error) =
                match tokio::time::timeout(timeout, transport.send(destination, path, timeout))
                    .await
                {
                    Ok(Ok(_ack)) => {
                        let file_name = file_name_of(path);
                        let warning = self.success_warning(renamed.is_some(), &file_name, timeouts_seen);
                        tracing::info!(job_id = job_id.0, attempts, file_name, "upload complete");
                        return Ok(UploadReport {
                            attempts,
                            warning,
                            file_name,
                        });
                    }
                    Ok(Err(e)) => (self.classify(&e), e),
                    Err(_elapsed) => (
                        FailureKind::Timeout,
                        TransportError::message(format!(
                            "upload timeout after {:.0}s",
                            timeout.as_secs_f64()
                        )),
                    ),
                };

            match kind {
                FailureKind::Fatal => {
                    tracing::error!(job_id = job_id.0, attempts, error = %error, "upload failed");
                    return Err(UploadError::Fatal { source: error });
                }
                FailureKind::RiskControl => {
                    if attempts >= max_attempts {
                        tracing::error!(
                            job_id = job_id.0,
                            attempts,
                            error = %error,
                            "upload rejected on every attempt"
                        );
                        return Err(UploadError::TransientExhausted {
                            attempts,
                            last: error,
                        });
                    }

                    if self.config.simplify_name_on_retry && renamed.is_none() {
                        *renamed = self.make_fallback_copy(job_id, content_id, artifact).await;
                    }
                }
                FailureKind::Timeout => {
                    timeouts_seen += 1;
                    self.emit(Event::SlowUpload { job_id, timeout });

                    if timeouts_seen > self.config.timeout_retries || attempts >= max_attempts {
                        tracing::error!(
                            job_id = job_id.0,
                            attempts,
                            timeout_secs = timeout.as_secs_f64(),
                            "upload timed out"
                        );
                        return Err(UploadError::SlowUpload { attempts, timeout });
                    }
                }
            }

            let delay = self.config.backoff.saturating_mul(attempts);
            tracing::warn!(
                job_id = job_id.0,
                attempt = attempts,
                max_attempts,
                kind = ?kind,
                error = %error,
                delay_ms = delay.as_millis(),
                "upload failed, retrying"
            );
            self.emit(Event::UploadRetry {
                job_id,
                attempt: attempts,
                reason: error.to_string(),
            });
            tokio::time::sleep(delay).await;
        }
    }

    /// Classify a transport failure
    pub(crate) fn classify(&self, error: &TransportError) -> FailureKind {
        if error
            .retcode
            .is_some_and(|code| self.config.risk_control_retcodes.contains(&code))
        {
            return FailureKind::RiskControl;
        }

        let message = error.message.to_lowercase();
        if self
            .config
            .risk_control_patterns
            .iter()
            .any(|p| !p.is_empty() && message.contains(&p.to_lowercase()))
        {
            return FailureKind::RiskControl;
        }

        if (message.contains("timeout") || message.contains("network error"))
            && message.contains("upload")
        {
            return FailureKind::Timeout;
        }

        FailureKind::Fatal
    }

    /// Copy the artifact under the simplified name, next to the original
    ///
    /// Returns None (and the original keeps being used) when the name would
    /// not change or the copy fails.
    async fn make_fallback_copy(
        &self,
        job_id: JobId,
        content_id: &ContentId,
        artifact: &Artifact,
    ) -> Option<PathBuf> {
        let name = fallback_file_name(
            &self.config.fallback_name_prefix,
            content_id.as_str(),
            &artifact.path,
            self.config.max_file_name_len,
        );
        let target = match artifact.path.parent() {
            Some(parent) => parent.join(&name),
            None => PathBuf::from(&name),
        };
        if target == artifact.path {
            return None;
        }

        match tokio::fs::copy(&artifact.path, &target).await {
            Ok(_) => {
                tracing::info!(job_id = job_id.0, file_name = name, "retrying under simplified file name");
                Some(target)
            }
            Err(e) => {
                tracing::warn!(job_id = job_id.0, error = %e, "failed to create renamed copy, keeping original name");
                None
            }
        }
    }

    fn success_warning(&self, renamed: bool, file_name: &str, timeouts_seen: u32) -> Option<String> {
        let mut notes = Vec::new();
        if renamed {
            notes.push(format!(
                "the platform rejected the original file name, sent as {}",
                file_name
            ));
        }
        if timeouts_seen > 0 {
            notes.push("the upload was slow and needed another attempt".to_string());
        }
        if notes.is_empty() {
            None
        } else {
            Some(notes.join("; "))
        }
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
