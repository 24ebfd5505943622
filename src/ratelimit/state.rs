//! Per-client state records.

use crate::error::{Result, TurnstileError};

use super::quota::{Algorithm, WindowQuota};

/// Fixed window counter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindowState {
    /// Epoch-aligned start of the window being counted
    pub window_start: u64,
    /// Requests admitted in that window
    pub count: u64,
}

/// Sliding window counter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowState {
    /// Epoch-aligned start of the current window
    pub window_start: u64,
    /// Requests admitted in the current window
    pub current_count: u64,
    /// Requests admitted in the window immediately before it
    pub prev_count: u64,
}

/// Token bucket state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketState {
    /// Time of the last lazy refill, in epoch seconds
    pub last_refill_time: f64,
    /// Tokens currently available
    pub tokens: f64,
}

/// The state a single engine keeps for one client.
///
/// Each engine only ever reads its own variant; finding any other variant
/// under a key is treated as corruption.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClientState {
    FixedWindow(FixedWindowState),
    SlidingWindow(SlidingWindowState),
    TokenBucket(TokenBucketState),
}

impl ClientState {
    /// The algorithm that owns this record.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            ClientState::FixedWindow(_) => Algorithm::FixedWindow,
            ClientState::SlidingWindow(_) => Algorithm::SlidingWindow,
            ClientState::TokenBucket(_) => Algorithm::TokenBucket,
        }
    }

    /// Timestamp of the most recent activity this record can vouch for.
    ///
    /// Window states only know the start of their window, so this is a lower
    /// bound for them.
    pub fn last_activity(&self) -> f64 {
        match self {
            ClientState::FixedWindow(s) => s.window_start as f64,
            ClientState::SlidingWindow(s) => s.window_start as f64,
            ClientState::TokenBucket(s) => s.last_refill_time,
        }
    }

    fn mismatch(&self, expected: Algorithm) -> TurnstileError {
        TurnstileError::corrupt(format!(
            "expected {} state, found {} state",
            expected,
            self.algorithm()
        ))
    }

    /// Extract a fixed window record, checking it against `quota`.
    pub(crate) fn fixed_window(&self, quota: &WindowQuota) -> Result<FixedWindowState> {
        match self {
            ClientState::FixedWindow(s) => {
                check_window(s.window_start, quota)?;
                Ok(*s)
            }
            other => Err(other.mismatch(Algorithm::FixedWindow)),
        }
    }

    /// Extract a sliding window record, checking it against `quota`.
    pub(crate) fn sliding_window(&self, quota: &WindowQuota) -> Result<SlidingWindowState> {
        match self {
            ClientState::SlidingWindow(s) => {
                check_window(s.window_start, quota)?;
                Ok(*s)
            }
            other => Err(other.mismatch(Algorithm::SlidingWindow)),
        }
    }

    /// Extract a token bucket record.
    pub(crate) fn token_bucket(&self) -> Result<TokenBucketState> {
        match self {
            ClientState::TokenBucket(s) => {
                if !s.tokens.is_finite() || s.tokens < 0.0 {
                    return Err(TurnstileError::corrupt(format!(
                        "token count {} is not a non-negative number",
                        s.tokens
                    )));
                }
                if !s.last_refill_time.is_finite() || s.last_refill_time < 0.0 {
                    return Err(TurnstileError::corrupt(format!(
                        "refill time {} is not a valid timestamp",
                        s.last_refill_time
                    )));
                }
                Ok(*s)
            }
            other => Err(other.mismatch(Algorithm::TokenBucket)),
        }
    }
}

fn check_window(window_start: u64, quota: &WindowQuota) -> Result<()> {
    if window_start.checked_add(quota.window_size_seconds).is_none() {
        return Err(TurnstileError::corrupt(format!(
            "window start {} has no representable end",
            window_start
        )));
    }
    if window_start % quota.window_size_seconds != 0 {
        return Err(TurnstileError::corrupt(format!(
            "window start {} is not aligned to a {}s window",
            window_start, quota.window_size_seconds
        )));
    }
    Ok(())
}

impl From<FixedWindowState> for ClientState {
    fn from(state: FixedWindowState) -> Self {
        ClientState::FixedWindow(state)
    }
}

impl From<SlidingWindowState> for ClientState {
    fn from(state: SlidingWindowState) -> Self {
        ClientState::SlidingWindow(state)
    }
}

impl From<TokenBucketState> for ClientState {
    fn from(state: TokenBucketState) -> Self {
        ClientState::TokenBucket(state)
    }
}
