//! Turnstile - per-client request admission
//!
//! This crate decides, per client identifier, whether a request may proceed
//! under a configured quota. Three interchangeable algorithms are provided
//! (fixed window, sliding window counter, token bucket), all sharing a
//! sharded in-memory client store that keeps each decision atomic per key.

pub mod config;
pub mod error;
pub mod ratelimit;
