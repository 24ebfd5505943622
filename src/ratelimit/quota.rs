//! Quota configuration values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which admission algorithm an engine implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Epoch-anchored fixed windows
    FixedWindow,
    /// Two-window weighted counter
    SlidingWindow,
    /// Continuously refilling token bucket
    TokenBucket,
}

impl Algorithm {
    /// Whether this algorithm is configured with a [`WindowQuota`].
    pub fn uses_window_quota(&self) -> bool {
        matches!(self, Algorithm::FixedWindow | Algorithm::SlidingWindow)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::FixedWindow => "fixed_window",
            Algorithm::SlidingWindow => "sliding_window",
            Algorithm::TokenBucket => "token_bucket",
        };
        f.write_str(name)
    }
}

/// Quota for the fixed and sliding window algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowQuota {
    /// Length of one window in seconds
    pub window_size_seconds: u64,
    /// Maximum admitted requests per window
    pub max_requests: u64,
}

impl WindowQuota {
    pub fn new(window_size_seconds: u64, max_requests: u64) -> Self {
        Self {
            window_size_seconds,
            max_requests,
        }
    }

    /// Start of the epoch-anchored window containing `now`.
    ///
    /// Callers must have validated the quota; a zero window size is not
    /// meaningful here.
    pub(crate) fn window_start(&self, now: f64) -> u64 {
        let secs = now.max(0.0).floor() as u64;
        (secs / self.window_size_seconds) * self.window_size_seconds
    }
}

/// Quota for the token bucket algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketQuota {
    /// Maximum number of tokens the bucket holds
    pub capacity: f64,
    /// Tokens added per second
    pub refill_rate_per_second: f64,
}

impl BucketQuota {
    pub fn new(capacity: f64, refill_rate_per_second: f64) -> Self {
        Self {
            capacity,
            refill_rate_per_second,
        }
    }
}

/// A quota for any of the supported algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quota {
    Window(WindowQuota),
    Bucket(BucketQuota),
}

impl Quota {
    /// Whether this quota can drive the given algorithm.
    pub fn fits(&self, algorithm: Algorithm) -> bool {
        match self {
            Quota::Window(_) => algorithm.uses_window_quota(),
            Quota::Bucket(_) => algorithm == Algorithm::TokenBucket,
        }
    }
}

impl From<WindowQuota> for Quota {
    fn from(quota: WindowQuota) -> Self {
        Quota::Window(quota)
    }
}

impl From<BucketQuota> for Quota {
    fn from(quota: BucketQuota) -> Self {
        Quota::Bucket(quota)
    }
}
