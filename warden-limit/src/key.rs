//! Rate limit identities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use warden_core::{compose_key, RATE_LIMIT_NAMESPACE};

/// Who a limit applies to.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RateLimitKey {
    /// Unauthenticated request, keyed by client address.
    Ip(IpAddr),
    /// Authenticated request, keyed by user id.
    User(String),
    /// Caller-chosen identity, used verbatim.
    Custom(String),
}

impl RateLimitKey {
    pub fn user(id: impl fmt::Display) -> Self {
        RateLimitKey::User(id.to_string())
    }

    /// Key for the first usable client address, preferring proxy headers.
    ///
    /// `X-Forwarded-For` may list several hops; the first one is the client.
    pub fn from_forwarded(
        forwarded_for: Option<&str>,
        real_ip: Option<&str>,
        peer: IpAddr,
    ) -> Self {
        let from_forwarded = forwarded_for
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse().ok());
        let from_real_ip = real_ip.and_then(|value| value.trim().parse().ok());

        RateLimitKey::Ip(from_forwarded.or(from_real_ip).unwrap_or(peer))
    }

    /// Identity string the limiter records windows under.
    pub fn identity(&self) -> String {
        match self {
            RateLimitKey::Ip(ip) => ip.to_string(),
            RateLimitKey::User(id) => format!("user:{id}"),
            RateLimitKey::Custom(identity) => identity.clone(),
        }
    }

    /// Remote store key holding this identity's window.
    pub fn store_key(&self) -> String {
        store_key(&self.identity())
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

impl From<IpAddr> for RateLimitKey {
    fn from(ip: IpAddr) -> Self {
        RateLimitKey::Ip(ip)
    }
}

/// `ratelimit:{identity}`.
pub fn store_key(identity: &str) -> String {
    compose_key([RATE_LIMIT_NAMESPACE, identity])
}
