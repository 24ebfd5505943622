//! Error types for Turnstile.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Malformed client identifier, quota, or cost supplied by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored client state is the wrong shape or violates its invariants
    #[error("Corrupt client state: {0}")]
    CorruptState(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TurnstileError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        TurnstileError::InvalidArgument(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        TurnstileError::CorruptState(msg.into())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
