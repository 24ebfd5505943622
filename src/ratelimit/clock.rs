//! Time sources for the admission engines.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

/// A source of "current time", in seconds since the Unix epoch.
///
/// Engines read the clock exactly once per decision. Implementations are not
/// required to be monotonic; the engines clamp backwards movement.
pub trait Clock: Send + Sync {
    /// Current time in (fractional) seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// Clock backed by the host's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        // A host clock set before 1970 reads as the epoch itself.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A manually driven clock.
///
/// Clones share the same underlying time, so a test can hand one clone to an
/// engine and keep another to move time around.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<f64>>,
}

impl ManualClock {
    /// Create a clock frozen at `start` seconds.
    pub fn new(start: f64) -> Self {
        Self {
            current: Arc::new(RwLock::new(start)),
        }
    }

    /// Move the clock forward (or backward, for negative `secs`).
    pub fn advance(&self, secs: f64) {
        *self.current.write() += secs;
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, now: f64) {
        *self.current.write() = now;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.current.read()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> f64 {
        (**self).now()
    }
}
