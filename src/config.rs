//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Algorithm, BucketQuota, QuotaRules, WindowQuota};

/// Main configuration for Turnstile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Rate limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Stale client sweeping
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Admission algorithm
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,

    /// Quota rules; when absent a default quota for the algorithm applies
    #[serde(default)]
    pub rules: Option<QuotaRules>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            rules: None,
        }
    }
}

impl LimiterConfig {
    /// The configured rules, or the default rules for the algorithm.
    pub fn resolved_rules(&self) -> QuotaRules {
        match &self.rules {
            Some(rules) => rules.clone(),
            None if self.algorithm.uses_window_quota() => QuotaRules::new(WindowQuota::new(
                default_window_size(),
                default_max_requests(),
            )),
            None => QuotaRules::new(BucketQuota::new(
                default_bucket_capacity(),
                default_refill_rate(),
            )),
        }
    }
}

fn default_algorithm() -> Algorithm {
    Algorithm::FixedWindow
}

fn default_window_size() -> u64 {
    60
}

fn default_max_requests() -> u64 {
    100
}

fn default_bucket_capacity() -> f64 {
    10.0
}

fn default_refill_rate() -> f64 {
    1.0
}

/// Stale client sweeping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Whether to run the sweeper at all
    #[serde(default = "default_sweep_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Records idle longer than this many seconds are removed
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: default_sweep_enabled(),
            interval_secs: default_sweep_interval(),
            retention_secs: default_retention(),
        }
    }
}

fn default_sweep_enabled() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_retention() -> u64 {
    300
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig =
            serde_yaml::from_str(yaml).map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the limiter cannot run with.
    ///
    /// With sweeping enabled, the retention period must outlast every
    /// configured quota; otherwise the sweeper would drop a client that is
    /// still being throttled and let it start over with a fresh quota.
    pub fn validate(&self) -> Result<()> {
        let rules = self.limiter.resolved_rules();
        rules.validate(self.limiter.algorithm)?;

        if !self.sweep.enabled {
            return Ok(());
        }
        if self.sweep.interval_secs == 0 {
            return Err(TurnstileError::Config(
                "sweep.interval_secs must be greater than 0".to_string(),
            ));
        }

        let min_retention = rules.min_retention_secs();
        if (self.sweep.retention_secs as f64) < min_retention {
            return Err(TurnstileError::Config(format!(
                "sweep.retention_secs ({}) must be at least {} for the configured quotas",
                self.sweep.retention_secs, min_retention
            )));
        }
        Ok(())
    }
}
