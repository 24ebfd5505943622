//! Token bucket rate limiting.

use tracing::{debug, trace, warn};

use crate::error::{Result, TurnstileError};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::quota::{Algorithm, BucketQuota, Quota};
use super::state::TokenBucketState;
use super::store::ClientStore;
use super::validator;

/// A per-client token bucket.
///
/// Each client's bucket starts full at `capacity` and refills continuously at
/// `refill_rate_per_second`. Refill is computed lazily on every call; there is
/// no background timer. A request is admitted when the bucket holds at least
/// `cost` tokens.
pub struct TokenBucketRateLimiter<C: Clock = SystemClock> {
    clock: C,
    store: ClientStore,
}

impl TokenBucketRateLimiter {
    /// Create a limiter reading the host clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TokenBucketRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TokenBucketRateLimiter<C> {
    /// Create a limiter reading the given clock.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            store: ClientStore::new(),
        }
    }

    /// Decide whether a request costing one token may proceed.
    pub fn allow_one(&self, client_id: &str, quota: &BucketQuota) -> Result<bool> {
        self.allow(client_id, quota, 1.0)
    }

    /// Decide whether a request costing `cost` tokens may proceed.
    ///
    /// The refill is persisted even when the request is denied.
    pub fn allow(&self, client_id: &str, quota: &BucketQuota, cost: f64) -> Result<bool> {
        if !validator::validate_client_id(client_id) {
            return Err(TurnstileError::invalid("client_id must be a non-empty string"));
        }
        if !validator::validate_bucket_quota(quota) {
            return Err(TurnstileError::invalid(
                "capacity and refill_rate_per_second must be greater than 0",
            ));
        }
        if !validator::validate_cost(cost) {
            return Err(TurnstileError::invalid("cost must be greater than 0"));
        }

        let now = self.clock.now();
        let full = TokenBucketState {
            last_refill_time: now,
            tokens: quota.capacity,
        };

        let (admitted, tokens) = self.store.transact(client_id, |stored| {
            let mut state = match stored.map(|s| s.token_bucket()) {
                None => {
                    debug!(
                        client_id = %client_id,
                        capacity = quota.capacity,
                        "Creating token bucket"
                    );
                    full
                }
                Some(Ok(state)) => state,
                Some(Err(e)) => {
                    warn!(
                        client_id = %client_id,
                        error = %e,
                        "Resetting client state and denying request"
                    );
                    return (full.into(), (false, full.tokens));
                }
            };

            // Never refill for time the clock has walked back over.
            let elapsed = (now - state.last_refill_time).max(0.0);
            state.tokens = (state.tokens + elapsed * quota.refill_rate_per_second)
                .clamp(0.0, quota.capacity);
            state.last_refill_time = state.last_refill_time.max(now);

            if state.tokens < cost {
                return (state.into(), (false, state.tokens));
            }

            state.tokens = (state.tokens - cost).max(0.0);
            (state.into(), (true, state.tokens))
        });

        if admitted {
            trace!(client_id = %client_id, cost = cost, tokens = tokens, "Request admitted");
        } else {
            debug!(client_id = %client_id, cost = cost, tokens = tokens, "Rate limit exceeded");
        }
        Ok(admitted)
    }

    /// The store holding this limiter's client state.
    pub fn store(&self) -> &ClientStore {
        &self.store
    }
}

impl<C: Clock> RateLimiterBackend for TokenBucketRateLimiter<C> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::TokenBucket
    }

    fn check(&self, client_id: &str, quota: &Quota, cost: f64) -> Result<bool> {
        match quota {
            Quota::Bucket(quota) => self.allow(client_id, quota, cost),
            Quota::Window(_) => Err(TurnstileError::invalid(
                "token bucket limiter requires a bucket quota",
            )),
        }
    }

    fn store(&self) -> &ClientStore {
        &self.store
    }
}
