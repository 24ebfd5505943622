//! Sliding window counter rate limiting.

use tracing::{debug, trace, warn};

use crate::error::{Result, TurnstileError};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::quota::{Algorithm, Quota, WindowQuota};
use super::state::SlidingWindowState;
use super::store::ClientStore;
use super::validator;

/// Approximates a sliding window by blending two adjacent fixed windows.
///
/// The previous window's count is weighted by the fraction of the current
/// window still remaining, estimating how much of that traffic falls inside
/// the trailing `window_size_seconds` ending now. This smooths the burst a
/// plain fixed window lets through at every boundary, at the cost of one
/// extra counter per client.
pub struct SlidingWindowRateLimiter<C: Clock = SystemClock> {
    clock: C,
    store: ClientStore,
}

impl SlidingWindowRateLimiter {
    /// Create a limiter reading the host clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for SlidingWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SlidingWindowRateLimiter<C> {
    /// Create a limiter reading the given clock.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            store: ClientStore::new(),
        }
    }

    /// Decide whether a request from `client_id` may proceed.
    pub fn allow(&self, client_id: &str, quota: &WindowQuota) -> Result<bool> {
        if !validator::validate_client_id(client_id) {
            return Err(TurnstileError::invalid("client_id must be a non-empty string"));
        }
        if !validator::validate_window_quota(quota) {
            return Err(TurnstileError::invalid(
                "window_size_seconds and max_requests must be greater than 0",
            ));
        }

        let now = self.clock.now();
        let window_size = quota.window_size_seconds;
        let current_window_start = quota.window_start(now);
        let fresh = SlidingWindowState {
            window_start: current_window_start,
            current_count: 0,
            prev_count: 0,
        };

        let admitted = self.store.transact(client_id, |stored| {
            let mut state = match stored.map(|s| s.sliding_window(quota)) {
                None => {
                    debug!(
                        client_id = %client_id,
                        window_start = current_window_start,
                        "Creating sliding window state"
                    );
                    fresh
                }
                Some(Ok(state)) => state,
                Some(Err(e)) => {
                    warn!(
                        client_id = %client_id,
                        error = %e,
                        "Resetting client state and denying request"
                    );
                    return (fresh.into(), false);
                }
            };

            if state.window_start < current_window_start {
                let windows_passed = (current_window_start - state.window_start) / window_size;
                state = if windows_passed >= 2 {
                    // The previous window saw no traffic; its data is stale.
                    fresh
                } else {
                    SlidingWindowState {
                        window_start: current_window_start,
                        current_count: 0,
                        prev_count: state.current_count,
                    }
                };
                trace!(
                    client_id = %client_id,
                    windows_passed = windows_passed,
                    prev_count = state.prev_count,
                    "Window rolled over"
                );
            }

            // Measured against the stored window so a clock that stepped
            // backwards is weighed as the start of that window.
            let window_end = (state.window_start + window_size) as f64;
            let overlap = ((window_end - now) / window_size as f64).clamp(0.0, 1.0);
            let weighted_count = state.prev_count as f64 * overlap + state.current_count as f64;

            if weighted_count >= quota.max_requests as f64 {
                return (state.into(), false);
            }

            state.current_count += 1;
            (state.into(), true)
        });

        if admitted {
            trace!(client_id = %client_id, "Request admitted");
        } else {
            debug!(
                client_id = %client_id,
                max_requests = quota.max_requests,
                "Rate limit exceeded"
            );
        }
        Ok(admitted)
    }

    /// The store holding this limiter's client state.
    pub fn store(&self) -> &ClientStore {
        &self.store
    }
}

impl<C: Clock> RateLimiterBackend for SlidingWindowRateLimiter<C> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::SlidingWindow
    }

    fn check(&self, client_id: &str, quota: &Quota, cost: f64) -> Result<bool> {
        if !validator::validate_cost(cost) {
            return Err(TurnstileError::invalid("cost must be greater than 0"));
        }
        match quota {
            Quota::Window(quota) => self.allow(client_id, quota),
            Quota::Bucket(_) => Err(TurnstileError::invalid(
                "sliding window limiter requires a window quota",
            )),
        }
    }

    fn store(&self) -> &ClientStore {
        &self.store
    }
}
