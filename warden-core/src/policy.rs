//! Rate-limit policy values.
//!
//! Policies live here rather than in `warden-limit` because configuration
//! parses them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ValidationError;

/// `max_requests` admissions per trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    max_requests: u32,
    window_secs: u64,
}

impl RateLimitPolicy {
    /// A zero window can never hold an admission, so it is rejected.
    /// A zero `max_requests` is allowed and rejects everything.
    pub fn new(max_requests: u32, window_secs: u64) -> Result<Self, ValidationError> {
        if window_secs == 0 {
            return Err(ValidationError::invalid(
                "window_seconds",
                "window must be at least one second",
            ));
        }
        Ok(Self {
            max_requests,
            window_secs,
        })
    }

    pub fn per_second(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_secs: 1,
        }
    }

    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_secs: 60,
        }
    }

    pub fn per_hour(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_secs: 3_600,
        }
    }

    pub fn per_day(max_requests: u32) -> Self {
        Self {
            max_requests,
            window_secs: 86_400,
        }
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.window_secs {
            1 => write!(f, "{}/second", self.max_requests),
            60 => write!(f, "{}/minute", self.max_requests),
            3_600 => write!(f, "{}/hour", self.max_requests),
            86_400 => write!(f, "{}/day", self.max_requests),
            w => write!(f, "{}/{}s", self.max_requests, w),
        }
    }
}

/// Parses `"10/minute"`, `"5/hours"`, `"30/90s"`, `"2/1h"`.
impl FromStr for RateLimitPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| {
            ValidationError::invalid("rate_limit", format!("{reason}: {s:?}"))
        };

        let (count, unit) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("expected <count>/<period>"))?;

        let max_requests: u32 = count
            .trim()
            .parse()
            .map_err(|_| invalid("count is not a non-negative integer"))?;

        let unit = unit.trim().to_ascii_lowercase();
        let window_secs = match unit.as_str() {
            "second" | "seconds" | "sec" => 1,
            "minute" | "minutes" | "min" => 60,
            "hour" | "hours" => 3_600,
            "day" | "days" => 86_400,
            other => {
                let split = other
                    .find(|c: char| !c.is_ascii_digit())
                    .ok_or_else(|| invalid("period has no unit"))?;
                let (n, suffix) = other.split_at(split);
                let n: u64 = n.parse().map_err(|_| invalid("period is not a number"))?;
                let scale = match suffix {
                    "s" => 1,
                    "m" => 60,
                    "h" => 3_600,
                    "d" => 86_400,
                    _ => return Err(invalid("unknown period unit")),
                };
                n.checked_mul(scale).ok_or_else(|| invalid("period overflows"))?
            }
        };

        RateLimitPolicy::new(max_requests, window_secs)
    }
}

/// What the limiter answers when the remote store errors mid-check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit the request. Favors availability.
    #[default]
    Open,
    /// Reject the request. Favors strict enforcement.
    Closed,
}

impl FailurePolicy {
    pub fn admits(&self) -> bool {
        matches!(self, FailurePolicy::Open)
    }
}

impl FromStr for FailurePolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "fail-open" | "allow" => Ok(FailurePolicy::Open),
            "closed" | "fail-closed" | "deny" => Ok(FailurePolicy::Closed),
            other => Err(ValidationError::invalid(
                "failure_policy",
                format!("expected open or closed, got {other:?}"),
            )),
        }
    }
}

/// Named policies for protected operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    policies: BTreeMap<String, RateLimitPolicy>,
    default: RateLimitPolicy,
}

impl PolicyTable {
    pub const DEFAULT_NAME: &'static str = "default";

    pub fn new(default: RateLimitPolicy) -> Self {
        Self {
            policies: BTreeMap::new(),
            default,
        }
    }

    pub fn with(mut self, name: impl Into<String>, policy: RateLimitPolicy) -> Self {
        self.insert(name, policy);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, policy: RateLimitPolicy) {
        let name = name.into().to_ascii_lowercase();
        if name == Self::DEFAULT_NAME {
            self.default = policy;
        } else {
            self.policies.insert(name, policy);
        }
    }

    /// Policy for `name`, or the default policy when none is registered.
    pub fn get(&self, name: &str) -> RateLimitPolicy {
        self.policies
            .get(&name.to_ascii_lowercase())
            .copied()
            .unwrap_or(self.default)
    }

    pub fn default_policy(&self) -> RateLimitPolicy {
        self.default
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::new(RateLimitPolicy::per_hour(100))
            .with("register", RateLimitPolicy::per_hour(5))
            .with("login", RateLimitPolicy::per_minute(10))
            .with("root", RateLimitPolicy::per_minute(2))
            .with("health", RateLimitPolicy::per_minute(100))
            .with("predict", RateLimitPolicy::per_minute(30))
            .with("predict_batch", RateLimitPolicy::per_hour(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_units() {
        assert_eq!(
            "10/minute".parse::<RateLimitPolicy>(),
            Ok(RateLimitPolicy::per_minute(10))
        );
        assert_eq!(
            "5/hours".parse::<RateLimitPolicy>(),
            Ok(RateLimitPolicy::per_hour(5))
        );
        assert_eq!(
            " 1 / Day ".parse::<RateLimitPolicy>(),
            Ok(RateLimitPolicy::per_day(1))
        );
    }

    #[test]
    fn test_parse_compact_units() {
        let p: RateLimitPolicy = "30/90s".parse().expect("30/90s should parse");
        assert_eq!(p.max_requests(), 30);
        assert_eq!(p.window_secs(), 90);

        let p: RateLimitPolicy = "2/1h".parse().expect("2/1h should parse");
        assert_eq!(p.window_secs(), 3_600);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("ten/minute".parse::<RateLimitPolicy>().is_err());
        assert!("10".parse::<RateLimitPolicy>().is_err());
        assert!("10/fortnight".parse::<RateLimitPolicy>().is_err());
        assert!("10/0s".parse::<RateLimitPolicy>().is_err());
        assert!("-1/minute".parse::<RateLimitPolicy>().is_err());
    }

    #[test]
    fn test_display_roundtrips_common_windows() {
        for p in [
            RateLimitPolicy::per_minute(10),
            RateLimitPolicy::per_hour(5),
            RateLimitPolicy::new(3, 45).expect("valid policy"),
        ] {
            assert_eq!(p.to_string().parse::<RateLimitPolicy>(), Ok(p));
        }
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(RateLimitPolicy::new(10, 0).is_err());
        assert!(RateLimitPolicy::new(0, 60).is_ok());
    }

    #[test]
    fn test_failure_policy_parse() {
        assert_eq!("open".parse(), Ok(FailurePolicy::Open));
        assert_eq!("CLOSED".parse(), Ok(FailurePolicy::Closed));
        assert!("maybe".parse::<FailurePolicy>().is_err());
        assert!(FailurePolicy::default().admits());
    }

    #[test]
    fn test_policy_table_defaults() {
        let table = PolicyTable::default();
        assert_eq!(table.get("login"), RateLimitPolicy::per_minute(10));
        assert_eq!(table.get("PREDICT"), RateLimitPolicy::per_minute(30));
        assert_eq!(table.get("unknown"), RateLimitPolicy::per_hour(100));
    }

    #[test]
    fn test_policy_table_default_override() {
        let mut table = PolicyTable::default();
        table.insert("default", RateLimitPolicy::per_minute(1));
        assert_eq!(table.default_policy(), RateLimitPolicy::per_minute(1));
        assert!(table.names().all(|n| n != "default"));
    }
}
