//! Fixed window rate limiting.

use tracing::{debug, trace, warn};

use crate::error::{Result, TurnstileError};

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::quota::{Algorithm, Quota, WindowQuota};
use super::state::FixedWindowState;
use super::store::ClientStore;
use super::validator;

/// Admits at most `max_requests` per epoch-anchored window.
///
/// Windows start at multiples of `window_size_seconds`, so every client rolls
/// over at the same instant. Counts do not carry across a boundary.
pub struct FixedWindowRateLimiter<C: Clock = SystemClock> {
    clock: C,
    store: ClientStore,
}

impl FixedWindowRateLimiter {
    /// Create a limiter reading the host clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FixedWindowRateLimiter<C> {
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
        let current_window_start = quota.window_start(now);
        let fresh = FixedWindowState {
            window_start: current_window_start,
            count: 0,
        };

        let admitted = self.store.transact(client_id, |stored| {
            let mut state = match stored.map(|s| s.fixed_window(quota)) {
                None => {
                    debug!(
                        client_id = %client_id,
                        window_start = current_window_start,
                        "Creating fixed window state"
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

            // A clock that stepped backwards keeps counting in the stored window.
            if state.window_start < current_window_start {
                trace!(
                    client_id = %client_id,
                    from = state.window_start,
                    to = current_window_start,
                    "Window rolled over"
                );
                state = fresh;
            }

            if state.count >= quota.max_requests {
                return (state.into(), false);
            }

            state.count += 1;
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

impl<C: Clock> RateLimiterBackend for FixedWindowRateLimiter<C> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::FixedWindow
    }

    fn check(&self, client_id: &str, quota: &Quota, cost: f64) -> Result<bool> {
        if !validator::validate_cost(cost) {
            return Err(TurnstileError::invalid("cost must be greater than 0"));
        }
        match quota {
            Quota::Window(quota) => self.allow(client_id, quota),
            Quota::Bucket(_) => Err(TurnstileError::invalid(
                "fixed window limiter requires a window quota",
            )),
        }
    }

    fn store(&self) -> &ClientStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::quota::BucketQuota;
    use crate::ratelimit::state::{ClientState, TokenBucketState};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn limiter_at(now: f64) -> (FixedWindowRateLimiter<ManualClock>, ManualClock) {
        let clock = ManualClock::new(now);
        (FixedWindowRateLimiter::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_ten_calls_at_one_instant() {
        let (limiter, _clock) = limiter_at(1_000.0);
        let quota = WindowQuota::new(5, 5);

        let results: Vec<bool> = (0..10)
            .map(|_| limiter.allow("user_1", &quota).unwrap())
            .collect();

        assert_eq!(
            results,
            vec![true, true, true, true, true, false, false, false, false, false]
        );
    }

    #[test]
    fn test_exactly_max_requests_per_window() {
        for max in [1, 2, 7, 50] {
            let (limiter, _clock) = limiter_at(120.0);
            let quota = WindowQuota::new(60, max);

            for i in 0..max {
                assert!(limiter.allow("client", &quota).unwrap(), "request {} should pass", i);
            }
            assert!(!limiter.allow("client", &quota).unwrap());
        }
    }

    #[test]
    fn test_denial_does_not_increment() {
        let (limiter, _clock) = limiter_at(0.0);
        let quota = WindowQuota::new(10, 2);

        for _ in 0..5 {
            limiter.allow("client", &quota).unwrap();
        }

        assert_eq!(
            limiter.store().get("client"),
            Some(ClientState::FixedWindow(FixedWindowState {
                window_start: 0,
                count: 2,
            }))
        );
    }

    #[test]
    fn test_window_boundary_resets() {
        let (limiter, clock) = limiter_at(1_009.0);
        let quota = WindowQuota::new(10, 3);

        for _ in 0..3 {
            assert!(limiter.allow("client", &quota).unwrap());
        }
        assert!(!limiter.allow("client", &quota).unwrap());

        clock.set(1_010.0);
        assert!(limiter.allow("client", &quota).unwrap());
    }

    #[test]
    fn test_reset_after_many_skipped_windows() {
        let (limiter, clock) = limiter_at(0.0);
        let quota = WindowQuota::new(5, 1);

        assert!(limiter.allow("client", &quota).unwrap());
        assert!(!limiter.allow("client", &quota).unwrap());

        clock.advance(5.0 * 37.0 + 2.0);
        assert!(limiter.allow("client", &quota).unwrap());
        assert!(!limiter.allow("client", &quota).unwrap());
    }

    #[test]
    fn test_backwards_clock_does_not_reset() {
        let (limiter, clock) = limiter_at(100.0);
        let quota = WindowQuota::new(10, 2);

        assert!(limiter.allow("client", &quota).unwrap());
        assert!(limiter.allow("client", &quota).unwrap());

        clock.set(95.0);
        assert!(!limiter.allow("client", &quota).unwrap());
    }

    #[test]
    fn test_clients_are_independent() {
        let (limiter, _clock) = limiter_at(0.0);
        let quota = WindowQuota::new(10, 1);

        assert!(limiter.allow("a", &quota).unwrap());
        assert!(!limiter.allow("a", &quota).unwrap());
        assert!(limiter.allow("b", &quota).unwrap());
    }

    #[test]
    fn test_invalid_arguments() {
        let (limiter, _clock) = limiter_at(0.0);

        assert!(matches!(
            limiter.allow("", &WindowQuota::new(5, 5)),
            Err(TurnstileError::InvalidArgument(_))
        ));
        assert!(matches!(
            limiter.allow("a", &WindowQuota::new(0, 5)),
            Err(TurnstileError::InvalidArgument(_))
        ));
        assert!(matches!(
            limiter.allow("a", &WindowQuota::new(5, 0)),
            Err(TurnstileError::InvalidArgument(_))
        ));
        assert!(limiter.store().is_empty());
    }

    #[test]
    fn test_corrupt_state_fails_closed() {
        let (limiter, _clock) = limiter_at(0.0);
        let quota = WindowQuota::new(10, 5);
        limiter.store().put(
            "client",
            TokenBucketState {
                last_refill_time: 0.0,
                tokens: 100.0,
            }
            .into(),
        );

        assert!(!limiter.allow("client", &quota).unwrap());
        assert_eq!(
            limiter.store().get("client"),
            Some(ClientState::FixedWindow(FixedWindowState {
                window_start: 0,
                count: 0,
            }))
        );
        assert!(limiter.allow("client", &quota).unwrap());
    }

    #[test]
    fn test_overflowing_window_start_fails_closed() {
        let (limiter, _clock) = limiter_at(1_000.0);
        let quota = WindowQuota::new(5, 5);
        limiter.store().put(
            "client",
            FixedWindowState {
                window_start: u64::MAX,
                count: 0,
            }
            .into(),
        );

        assert!(!limiter.allow("client", &quota).unwrap());
        assert!(limiter.allow("client", &quota).unwrap());
    }

    #[test]
    fn test_concurrent_callers_admit_exactly_quota() {
        let clock = ManualClock::new(500.0);
        let limiter = Arc::new(FixedWindowRateLimiter::with_clock(clock));
        let quota = WindowQuota::new(60, 25);
        let threads = 64;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    limiter.allow("hot", &quota).unwrap()
                })
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted, 25);
    }

    #[test]
    fn test_backend_rejects_bucket_quota() {
        let (limiter, _clock) = limiter_at(0.0);
        let quota = Quota::Bucket(BucketQuota::new(1.0, 1.0));

        assert_eq!(limiter.algorithm(), Algorithm::FixedWindow);
        assert!(matches!(
            limiter.check("a", &quota, 1.0),
            Err(TurnstileError::InvalidArgument(_))
        ));
        assert!(matches!(
            limiter.check("a", &Quota::Window(WindowQuota::new(1, 1)), 0.0),
            Err(TurnstileError::InvalidArgument(_))
        ));
        assert!(limiter.check("a", &Quota::Window(WindowQuota::new(1, 1)), 1.0).unwrap());
    }
}
