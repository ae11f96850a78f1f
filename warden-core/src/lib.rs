//! Warden Core - shared types
//!
//! Error taxonomy, configuration, policy values, clocks and health reports.
//! Every other warden crate depends on this one; it depends on no store.

pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod policy;
pub mod ttl;

pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CacheTtlConfig, RateLimitConfig, StoreConfig, WardenConfig};
pub use error::{
    ConfigError, StoreError, StoreResult, ValidationError, WardenError, WardenResult,
};
pub use health::{BackendKind, HealthCheck, HealthStatus, StoreInfo, StoreStatus};
pub use policy::{FailurePolicy, PolicyTable, RateLimitPolicy};
pub use ttl::{KeyTtl, Ttl};

/// Colon-delimited namespace separator used in every store key.
pub const KEY_SEPARATOR: char = ':';

/// Namespace of sliding-window keys written by the rate limiter.
pub const RATE_LIMIT_NAMESPACE: &str = "ratelimit";

/// Join key segments with [`KEY_SEPARATOR`].
pub fn compose_key<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut key = String::new();
    for (i, segment) in segments.into_iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(segment.as_ref());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_key() {
        assert_eq!(compose_key(["prediction", "C1", "abc"]), "prediction:C1:abc");
        assert_eq!(compose_key(["model", "info"]), "model:info");
        assert_eq!(compose_key(Vec::<String>::new()), "");
    }
}
