//! Warden Limit - sliding-window rate limiting
//!
//! [`RateLimiter`] admits at most `max_requests` per identity in any
//! trailing window of `window_secs`. Windows live in the shared store under
//! `ratelimit:{identity}` so all instances agree; while the store is
//! unreachable each process enforces the limit from its own
//! [`SlidingWindow`].
//!
//! Identities are plain strings. [`RateLimitKey`] renders the usual ones:
//! client addresses as-is and users as `user:{id}`.

pub mod headers;
pub mod key;
pub mod limiter;
pub mod window;

pub use headers::RateLimitHeaders;
pub use key::{store_key, RateLimitKey};
pub use limiter::{DecisionSource, RateLimitDecision, RateLimiter};
pub use window::SlidingWindow;
pub use warden_core::{FailurePolicy, PolicyTable, RateLimitPolicy};
