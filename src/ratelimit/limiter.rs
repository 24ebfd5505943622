//! Configured rate limiter facade.

use std::sync::Arc;
use tracing::{info, trace};

use crate::config::LimiterConfig;
use crate::error::Result;

use super::backend::RateLimiterBackend;
use super::clock::{Clock, SystemClock};
use super::fixed_window::FixedWindowRateLimiter;
use super::quota::{Algorithm, Quota};
use super::rules::QuotaRules;
use super::sliding_window::SlidingWindowRateLimiter;
use super::store::ClientStore;
use super::token_bucket::TokenBucketRateLimiter;

/// The rate limiter a service embeds.
///
/// Built from a [`LimiterConfig`], it resolves each client's quota from the
/// configured rules and delegates the decision to the configured algorithm.
/// Cloning is cheap and clones share all client state.
#[derive(Clone)]
pub struct RateLimiter {
    /// The algorithm engine
    backend: Arc<dyn RateLimiterBackend>,
    /// Quota resolution
    rules: Arc<QuotaRules>,
}

impl RateLimiter {
    /// Create a rate limiter reading the host clock.
    pub fn from_config(config: &LimiterConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a rate limiter reading the given clock.
    pub fn with_clock<C: Clock + 'static>(config: &LimiterConfig, clock: C) -> Result<Self> {
        let rules = config.resolved_rules();
        rules.validate(config.algorithm)?;

        let backend: Arc<dyn RateLimiterBackend> = match config.algorithm {
            Algorithm::FixedWindow => Arc::new(FixedWindowRateLimiter::with_clock(clock)),
            Algorithm::SlidingWindow => Arc::new(SlidingWindowRateLimiter::with_clock(clock)),
            Algorithm::TokenBucket => Arc::new(TokenBucketRateLimiter::with_clock(clock)),
        };

        info!(
            algorithm = %config.algorithm,
            default_quota = ?rules.default,
            overrides = rules.clients.len(),
            "Rate limiter initialized"
        );

        Ok(Self {
            backend,
            rules: Arc::new(rules),
        })
    }

    /// Decide whether a request from `client_id` costing `cost` may proceed.
    pub fn check(&self, client_id: &str, cost: f64) -> Result<bool> {
        let quota = self.rules.quota_for(client_id);
        trace!(client_id = %client_id, quota = ?quota, cost = cost, "Checking rate limit");
        self.backend.check(client_id, quota, cost)
    }

    /// The quota that applies to `client_id`.
    pub fn quota_for(&self, client_id: &str) -> Quota {
        *self.rules.quota_for(client_id)
    }

    /// The configured algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.backend.algorithm()
    }

    /// The store holding client state, e.g. for a [`Sweeper`](super::Sweeper).
    pub fn store(&self) -> &ClientStore {
        self.backend.store()
    }
}
