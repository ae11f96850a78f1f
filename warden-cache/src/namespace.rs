//! Cache namespaces, their keys and their TTLs.

use serde::{Deserialize, Serialize};
use std::fmt;
use warden_core::{compose_key, CacheTtlConfig, Ttl, ValidationError, RATE_LIMIT_NAMESPACE};
use warden_storage::{escape, prefix_pattern};

/// The entity classes the domain cache knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheNamespace {
    Prediction,
    User,
    Analytics,
    History,
    ModelInfo,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 5] = [
        CacheNamespace::Prediction,
        CacheNamespace::User,
        CacheNamespace::Analytics,
        CacheNamespace::History,
        CacheNamespace::ModelInfo,
    ];

    /// First key segment.
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Prediction => "prediction",
            CacheNamespace::User => "user",
            CacheNamespace::Analytics => "analytics",
            CacheNamespace::History => "history",
            CacheNamespace::ModelInfo => "model",
        }
    }

    /// Pattern selecting every key in the namespace.
    pub fn pattern(&self) -> String {
        prefix_pattern(&format!("{}:", self.prefix()))
    }

    pub fn ttl(&self, ttls: &CacheTtls) -> Ttl {
        match self {
            CacheNamespace::Prediction => ttls.prediction,
            CacheNamespace::User => ttls.user,
            CacheNamespace::Analytics => ttls.analytics,
            CacheNamespace::History => ttls.history,
            CacheNamespace::ModelInfo => ttls.model_info,
        }
    }

    /// Namespace owning `key`, judged by its first segment.
    pub fn of_key(key: &str) -> Option<Self> {
        let head = key.split_once(':')?.0;
        Self::ALL.into_iter().find(|ns| ns.prefix() == head)
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A fully built cache key and the namespace it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: CacheNamespace,
    key: String,
}

impl CacheKey {
    /// `prediction:{customer_id}:{input_hash}`
    pub fn prediction(customer_id: &str, input_hash: &str) -> Self {
        Self {
            namespace: CacheNamespace::Prediction,
            key: compose_key(["prediction", customer_id, input_hash]),
        }
    }

    /// `user:{user_id}`
    pub fn user(user_id: impl fmt::Display) -> Self {
        Self {
            namespace: CacheNamespace::User,
            key: compose_key(["user".to_string(), user_id.to_string()]),
        }
    }

    /// `analytics:{kind}`
    pub fn analytics(kind: &str) -> Self {
        Self {
            namespace: CacheNamespace::Analytics,
            key: compose_key(["analytics", kind]),
        }
    }

    /// `history:{user_id}:{limit}`
    pub fn history(user_id: impl fmt::Display, limit: u32) -> Self {
        Self {
            namespace: CacheNamespace::History,
            key: compose_key([
                "history".to_string(),
                user_id.to_string(),
                limit.to_string(),
            ]),
        }
    }

    /// `model:info`
    pub fn model_info() -> Self {
        Self {
            namespace: CacheNamespace::ModelInfo,
            key: compose_key(["model", "info"]),
        }
    }

    pub fn namespace(&self) -> CacheNamespace {
        self.namespace
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Pattern for every prediction, or every prediction of one customer.
pub fn predictions_pattern(customer_id: Option<&str>) -> String {
    match customer_id {
        Some(id) => format!("prediction:{}:*", escape(id)),
        None => CacheNamespace::Prediction.pattern(),
    }
}

/// Pattern for every history page, or every page of one user.
pub fn history_pattern(user_id: Option<&str>) -> String {
    match user_id {
        Some(id) => format!("history:{}:*", escape(id)),
        None => CacheNamespace::History.pattern(),
    }
}

/// Validated per-namespace TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub prediction: Ttl,
    pub user: Ttl,
    pub analytics: Ttl,
    pub history: Ttl,
    pub model_info: Ttl,
}

impl CacheTtls {
    pub fn from_config(config: &CacheTtlConfig) -> Result<Self, ValidationError> {
        let ttl = |field: &str, secs: u64| {
            Ttl::secs(secs).map_err(|_| {
                ValidationError::invalid(field, "cache ttl must be at least one second")
            })
        };
        Ok(Self {
            prediction: ttl("prediction_secs", config.prediction_secs)?,
            user: ttl("user_secs", config.user_secs)?,
            analytics: ttl("analytics_secs", config.analytics_secs)?,
            history: ttl("history_secs", config.history_secs)?,
            model_info: ttl("model_info_secs", config.model_info_secs)?,
        })
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        let config = CacheTtlConfig::default();
        Self {
            prediction: Ttl::at_least_one(config.prediction_secs),
            user: Ttl::at_least_one(config.user_secs),
            analytics: Ttl::at_least_one(config.analytics_secs),
            history: Ttl::at_least_one(config.history_secs),
            model_info: Ttl::at_least_one(config.model_info_secs),
        }
    }
}

/// Key counts by namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCounts {
    pub predictions: u64,
    pub users: u64,
    pub analytics: u64,
    pub history: u64,
    pub model_info: u64,
    pub ratelimit: u64,
    pub other: u64,
}

impl KeyCounts {
    /// Count one key in its bucket.
    pub fn record(&mut self, key: &str) {
        match CacheNamespace::of_key(key) {
            Some(CacheNamespace::Prediction) => self.predictions += 1,
            Some(CacheNamespace::User) => self.users += 1,
            Some(CacheNamespace::Analytics) => self.analytics += 1,
            Some(CacheNamespace::History) => self.history += 1,
            Some(CacheNamespace::ModelInfo) => self.model_info += 1,
            None if key
                .strip_prefix(RATE_LIMIT_NAMESPACE)
                .is_some_and(|rest| rest.starts_with(':')) =>
            {
                self.ratelimit += 1
            }
            None => self.other += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.predictions
            + self.users
            + self.analytics
            + self.history
            + self.model_info
            + self.ratelimit
            + self.other
    }
}

impl<'a> FromIterator<&'a str> for KeyCounts {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut counts = KeyCounts::default();
        for key in iter {
            counts.record(key);
        }
        counts
    }
}
