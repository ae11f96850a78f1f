//! Rate limit response headers.
//!
//! The HTTP layer is not part of warden; this renders a decision into the
//! header pairs it should attach.

use crate::limiter::RateLimitDecision;

pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RESET_HEADER: &str = "X-RateLimit-Reset";
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u32,
    pub remaining: u32,
    pub reset: i64,
    /// Present only on rejection.
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// Header name and value pairs, `Retry-After` last when present.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            (LIMIT_HEADER, self.limit.to_string()),
            (REMAINING_HEADER, self.remaining.to_string()),
            (RESET_HEADER, self.reset.to_string()),
        ];
        if let Some(retry_after) = self.retry_after {
            pairs.push((RETRY_AFTER_HEADER, retry_after.to_string()));
        }
        pairs
    }
}

impl From<&RateLimitDecision> for RateLimitHeaders {
    fn from(decision: &RateLimitDecision) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset: decision.reset_at,
            retry_after: decision.retry_after,
        }
    }
}
