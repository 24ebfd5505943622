//! Input validation shared by all engines.
//!
//! These checks are pure; the engines turn a failed check into
//! [`TurnstileError::InvalidArgument`](crate::error::TurnstileError) before
//! touching any client state.

use super::quota::{BucketQuota, WindowQuota};

/// A client identifier must be a non-empty string.
pub fn validate_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
}

/// Both window quota fields must be strictly positive.
pub fn validate_window_quota(quota: &WindowQuota) -> bool {
    quota.window_size_seconds > 0 && quota.max_requests > 0
}

/// Both bucket quota fields must be finite and strictly positive.
pub fn validate_bucket_quota(quota: &BucketQuota) -> bool {
    is_positive(quota.capacity) && is_positive(quota.refill_rate_per_second)
}

/// A request cost must be finite and strictly positive.
pub fn validate_cost(cost: f64) -> bool {
    is_positive(cost)
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
