use mx_core::{MxError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure parsed from `mxstat.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MxConfig {
    /// How often and how finely CPU usage is sampled.
    pub sampling: SamplingConfig,
    /// How readings are written out.
    pub report: ReportConfig,
}

impl MxConfig {
    /// Reject settings the monitor cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sampling.interval_ms == 0 {
            return Err(MxError::Config("sampling.interval_ms must be > 0".into()));
        }
        if self.sampling.history == 0 {
            return Err(MxError::Config("sampling.history must be > 0".into()));
        }
        Ok(())
    }
}

/// Sampling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Poll period in milliseconds.
    pub interval_ms: u64,
    /// Shortest interval the estimator computes a load over, in milliseconds.
    pub minimum_interval_ms: u64,
    /// Number of valid system loads averaged into `system_cpu_average`.
    pub history: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            minimum_interval_ms: 10,
            history: 60,
        }
    }
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Minimum interval in the estimator's nanosecond units.
    pub fn minimum_interval_ns(&self) -> i64 {
        i64::try_from(self.minimum_interval_ms)
            .ok()
            .and_then(|ms| ms.checked_mul(1_000_000))
            .unwrap_or(i64::MAX)
    }
}

/// Output settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub format: ReportFormat,
    /// Report a missing CPU history as `0.0` rather than `-1.0`.
    pub cpu_load_compatibility: bool,
}

/// Line format for each snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}
