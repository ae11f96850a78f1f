//! Time-to-live values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ValidationError;

/// A validated expiry: whole seconds, never zero.
///
/// Redis rejects `EX 0`, and a zero TTL on a cache write is always a
/// mistake at the call site, so it is refused here rather than at the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Ttl(u64);

impl Ttl {
    pub fn new(duration: Duration) -> Result<Self, ValidationError> {
        Self::secs(duration.as_secs())
    }

    pub fn secs(secs: u64) -> Result<Self, ValidationError> {
        if secs == 0 {
            return Err(ValidationError::invalid(
                "ttl",
                "ttl must be at least one second",
            ));
        }
        Ok(Self(secs))
    }

    /// `secs`, raised to one second when zero.
    pub const fn at_least_one(secs: u64) -> Self {
        if secs == 0 {
            Self(1)
        } else {
            Self(secs)
        }
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl TryFrom<u64> for Ttl {
    type Error = ValidationError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::secs(secs)
    }
}

impl From<Ttl> for u64 {
    fn from(ttl: Ttl) -> Self {
        ttl.0
    }
}

/// Remaining lifetime of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key exists without an expiry.
    Persistent,
    /// Key does not exist.
    Missing,
    /// Key expires after the given duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Redis `TTL` convention: -1 for no expiry, -2 for an absent key.
    pub fn as_redis_secs(&self) -> i64 {
        match self {
            KeyTtl::Persistent => -1,
            KeyTtl::Missing => -2,
            KeyTtl::Expires(d) => d.as_secs() as i64,
        }
    }

    pub fn from_redis_secs(secs: i64) -> Self {
        match secs {
            -2 => KeyTtl::Missing,
            s if s < 0 => KeyTtl::Persistent,
            s => KeyTtl::Expires(Duration::from_secs(s as u64)),
        }
    }
}
