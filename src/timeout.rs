//! Adaptive upload timeout
//!
//! Larger artifacts get proportionally more time to upload, but never more
//! than the configured ceiling, so a single slot's worst-case occupancy stays
//! bounded.

use crate::config::UploadConfig;
use std::time::Duration;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Maps artifact size to an upload timeout
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UploadTimeouts {
    base: Duration,
    ceiling: Duration,
    grace_size_mb: f64,
    secs_per_mb: f64,
}

impl UploadTimeouts {
    /// Build an estimator from the upload settings
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            base: config.base_timeout,
            ceiling: config.max_upload_timeout,
            grace_size_mb: config.grace_size_mb.max(0.0),
            secs_per_mb: config.secs_per_mb.max(0.0),
        }
    }

    /// Upload timeout for an artifact of `size_bytes`
    ///
    /// Monotonically non-decreasing in size and never above the ceiling.
    #[must_use]
    pub fn estimate(&self, size_bytes: u64) -> Duration {
        let size_mb = size_bytes as f64 / BYTES_PER_MB;
        let extra_mb = (size_mb - self.grace_size_mb).max(0.0);
        let secs = self.base.as_secs_f64() + extra_mb * self.secs_per_mb;
        let ceiling = self.ceiling.as_secs_f64();

        if !secs.is_finite() || secs >= ceiling {
            return self.ceiling;
        }
        Duration::from_secs_f64(secs)
    }

    /// The ceiling applied by [`estimate`](Self::estimate)
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

impl Default for UploadTimeouts {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}
