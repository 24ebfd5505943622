//! Rate limiting logic and state management.

mod backend;
mod clock;
mod fixed_window;
mod limiter;
mod quota;
mod rules;
mod sliding_window;
mod state;
mod store;
mod sweep;
mod token_bucket;
pub mod validator;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use fixed_window::FixedWindowRateLimiter;
pub use limiter::RateLimiter;
pub use quota::{Algorithm, BucketQuota, Quota, WindowQuota};
pub use rules::{ClientRule, QuotaRules};
pub use sliding_window::SlidingWindowRateLimiter;
pub use state::{ClientState, FixedWindowState, SlidingWindowState, TokenBucketState};
pub use store::ClientStore;
pub use sweep::Sweeper;
pub use token_bucket::TokenBucketRateLimiter;
