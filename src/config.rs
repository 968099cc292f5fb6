//! Configuration types for comic-courier
//!
//! The configuration is read once at startup and shared as an immutable
//! `Arc<Config>`; nothing in the crate looks up settings globally.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Admission settings (feature switch, permissions, concurrency, queue size)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Master switch; when false every submission is refused (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Groups allowed to submit jobs (empty = unrestricted)
    ///
    /// Private-chat submissions are not subject to this list.
    #[serde(default)]
    pub allowed_groups: HashSet<String>,

    /// Maximum concurrently running jobs (default: 2)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum jobs waiting for a slot (default: 20)
    #[serde(default = "default_max_queue_len")]
    pub max_queue_len: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_groups: HashSet::new(),
            max_concurrent: default_max_concurrent(),
            max_queue_len: default_max_queue_len(),
        }
    }
}

impl AdmissionConfig {
    /// Whether submissions from `group` pass the allow-list
    pub fn is_group_allowed(&self, group: &str) -> bool {
        self.allowed_groups.is_empty() || self.allowed_groups.contains(group)
    }
}

/// Upload timeout and retry settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Timeout for short operations, also the floor of the upload timeout (default: 60s)
    #[serde(default = "default_base_timeout", with = "duration_serde")]
    pub base_timeout: Duration,

    /// Ceiling on the upload timeout (default: 300s)
    #[serde(default = "default_max_upload_timeout", with = "duration_serde")]
    pub max_upload_timeout: Duration,

    /// Artifacts up to this size (MiB) use the base timeout (default: 100)
    #[serde(default = "default_grace_size_mb")]
    pub grace_size_mb: f64,

    /// Extra seconds granted per MiB above the grace size (default: 0.5)
    #[serde(default = "default_secs_per_mb")]
    pub secs_per_mb: f64,

    /// Total upload attempts, first try included (default: 3)
    #[serde(default = "default_upload_attempts")]
    pub max_attempts: u32,

    /// Backoff unit between attempts; attempt `n` waits `n * backoff` (default: 2s)
    #[serde(default = "default_upload_backoff", with = "duration_serde")]
    pub backoff: Duration,

    /// Extra attempts allowed after a timeout (default: 1)
    #[serde(default = "default_timeout_retries")]
    pub timeout_retries: u32,

    /// Platform return codes treated as transient risk-control (default: [1200])
    #[serde(default = "default_risk_control_retcodes")]
    pub risk_control_retcodes: Vec<i64>,

    /// Message fragments treated as transient risk-control (case-insensitive)
    #[serde(default = "default_risk_control_patterns")]
    pub risk_control_patterns: Vec<String>,

    /// Retry risk-control failures under a simplified file name (default: true)
    #[serde(default = "default_true")]
    pub simplify_name_on_retry: bool,

    /// Prefix of the simplified file name (default: "JM_")
    #[serde(default = "default_fallback_prefix")]
    pub fallback_name_prefix: String,

    /// Maximum uploaded file name length, suffix included (default: 30)
    #[serde(default = "default_max_file_name_len")]
    pub max_file_name_len: usize,

    /// Allow only one upload at a time across all workers (default: true)
    #[serde(default = "default_true")]
    pub serialize_uploads: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_timeout: default_base_timeout(),
            max_upload_timeout: default_max_upload_timeout(),
            grace_size_mb: default_grace_size_mb(),
            secs_per_mb: default_secs_per_mb(),
            max_attempts: default_upload_attempts(),
            backoff: default_upload_backoff(),
            timeout_retries: default_timeout_retries(),
            risk_control_retcodes: default_risk_control_retcodes(),
            risk_control_patterns: default_risk_control_patterns(),
            simplify_name_on_retry: true,
            fallback_name_prefix: default_fallback_prefix(),
            max_file_name_len: default_max_file_name_len(),
            serialize_uploads: true,
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_fetch_retries")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 2 seconds)
    #[serde(default = "default_fetch_retry_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 1.0, fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_fetch_retries(),
            initial_delay: default_fetch_retry_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Working directory and cleanup settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Root under which each job gets its own working directory (default: "./work")
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// Delay between a job's terminal state and deletion of its directory (default: 600s)
    #[serde(default = "default_cleanup_delay", with = "duration_serde")]
    pub delay: Duration,

    /// Delete pending directories immediately on shutdown instead of leaving them (default: true)
    #[serde(default = "default_true")]
    pub purge_on_shutdown: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            work_root: default_work_root(),
            delay: default_cleanup_delay(),
            purge_on_shutdown: true,
        }
    }
}

/// User notification settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Append per-phase timings to the final notification (default: false)
    #[serde(default)]
    pub include_timings: bool,
}

/// Main configuration for [`Courier`](crate::Courier)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Admission settings
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Upload timeout and retry settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Retry policy for partial fetch failures
    #[serde(default)]
    pub fetch_retry: RetryConfig,

    /// Working directory and cleanup settings
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// User notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// How long shutdown waits for running jobs (default: 30s)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Parse a configuration from JSON and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file and validate it
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check settings that would make the courier unusable
    pub fn validate(&self) -> Result<()> {
        if self.admission.max_concurrent == 0 {
            return Err(config_error(
                "max_concurrent must be at least 1",
                "admission.max_concurrent",
            ));
        }
        if self.upload.max_attempts == 0 {
            return Err(config_error(
                "max_attempts must be at least 1",
                "upload.max_attempts",
            ));
        }
        if self.upload.max_upload_timeout.is_zero() {
            return Err(config_error(
                "max_upload_timeout must be greater than zero",
                "upload.max_upload_timeout",
            ));
        }
        if !(self.upload.secs_per_mb.is_finite() && self.upload.secs_per_mb >= 0.0) {
            return Err(config_error(
                "secs_per_mb must be a non-negative number",
                "upload.secs_per_mb",
            ));
        }
        if !(self.upload.grace_size_mb.is_finite() && self.upload.grace_size_mb >= 0.0) {
            return Err(config_error(
                "grace_size_mb must be a non-negative number",
                "upload.grace_size_mb",
            ));
        }
        let multiplier = self.fetch_retry.backoff_multiplier;
        if !(multiplier.is_finite() && multiplier >= 0.0) {
            return Err(config_error(
                "backoff_multiplier must be a non-negative number",
                "fetch_retry.backoff_multiplier",
            ));
        }
        if self.fetch_retry.max_delay < self.fetch_retry.initial_delay {
            return Err(config_error(
                "max_delay must not be shorter than initial_delay",
                "fetch_retry.max_delay",
            ));
        }
        if self.upload.max_file_name_len == 0 {
            return Err(config_error(
                "max_file_name_len must be at least 1",
                "upload.max_file_name_len",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    2
}

fn default_max_queue_len() -> usize {
    20
}

fn default_base_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_upload_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_grace_size_mb() -> f64 {
    100.0
}

fn default_secs_per_mb() -> f64 {
    0.5
}

fn default_upload_attempts() -> u32 {
    3
}

fn default_upload_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_timeout_retries() -> u32 {
    1
}

fn default_risk_control_retcodes() -> Vec<i64> {
    vec![1200]
}

fn default_risk_control_patterns() -> Vec<String> {
    vec!["rich media transfer failed".to_string()]
}

fn default_fallback_prefix() -> String {
    "JM_".to_string()
}

fn default_max_file_name_len() -> usize {
    30
}

fn default_fetch_retries() -> u32 {
    2
}

fn default_fetch_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_work_root() -> PathBuf {
    PathBuf::from("./work")
}

fn default_cleanup_delay() -> Duration {
    Duration::from_secs(600)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
