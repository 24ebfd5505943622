//! Rate limiter trait for abstracting over the admission algorithms.

use crate::error::Result;

use super::quota::{Algorithm, Quota};
use super::store::ClientStore;

/// Trait for rate limiter implementations.
///
/// This trait abstracts over the fixed window, sliding window and token bucket
/// engines so that a caller can pick the algorithm at runtime.
pub trait RateLimiterBackend: Send + Sync {
    /// The algorithm this backend implements.
    fn algorithm(&self) -> Algorithm;

    /// Decide whether a request from `client_id` may proceed under `quota`.
    ///
    /// `cost` must be positive. Only the token bucket spends it; the window
    /// algorithms count every admitted call as one request. A quota that does
    /// not belong to this algorithm is rejected as an invalid argument.
    fn check(&self, client_id: &str, quota: &Quota, cost: f64) -> Result<bool>;

    /// The store holding this backend's client state.
    fn store(&self) -> &ClientStore;
}
