//! Warden Configuration Module
//!
//! Configuration is consumed, not owned: the service composing warden
//! decides where values come from. [`WardenConfig::from_env`] covers the
//! common case of environment variables with development defaults.

use std::time::Duration;

use crate::error::{ConfigError, WardenResult};
use crate::policy::{FailurePolicy, PolicyTable, RateLimitPolicy};

// ============================================================================
// STORE CONFIGURATION
// ============================================================================

/// Remote key-value store connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `redis://` or `rediss://` URL. `None` runs on the fallback map only.
    pub url: Option<String>,

    /// Upper bound for establishing a connection.
    pub connect_timeout: Duration,

    /// Upper bound for any single command round trip.
    pub operation_timeout: Duration,

    /// Minimum delay between reconnect attempts after a failed connect.
    pub retry_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, operation: Duration) -> Self {
        self.connect_timeout = connect;
        self.operation_timeout = operation;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}

// ============================================================================
// RATE LIMIT CONFIGURATION
// ============================================================================

/// Rate limiter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Disables enforcement process-wide. Recorded windows are untouched.
    pub bypass: bool,

    /// Decision when the remote store errors during a check.
    pub failure_policy: FailurePolicy,

    /// Added to the window length when refreshing a window key's expiry,
    /// so abandoned keys clean themselves out of the remote store.
    pub expiry_margin: Duration,

    /// How often the in-process window sweeps idle keys.
    pub cleanup_interval: Duration,

    /// Keys whose newest admission is older than this are dropped by the sweep.
    pub retention: Duration,

    /// Named per-operation limits.
    pub policies: PolicyTable,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            bypass: false,
            failure_policy: FailurePolicy::Open,
            expiry_margin: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
            retention: Duration::from_secs(3_600),
            policies: PolicyTable::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_cleanup(mut self, interval: Duration, retention: Duration) -> Self {
        self.cleanup_interval = interval;
        self.retention = retention;
        self
    }

    pub fn with_policy(mut self, name: impl Into<String>, policy: RateLimitPolicy) -> Self {
        self.policies.insert(name, policy);
        self
    }
}

// ============================================================================
// CACHE CONFIGURATION
// ============================================================================

/// Per-namespace cache TTLs, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtlConfig {
    pub prediction_secs: u64,
    pub user_secs: u64,
    pub analytics_secs: u64,
    pub history_secs: u64,
    pub model_info_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            prediction_secs: 600,
            user_secs: 300,
            analytics_secs: 900,
            history_secs: 180,
            model_info_secs: 3_600,
        }
    }
}

// ============================================================================
// TOP-LEVEL CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WardenConfig {
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    pub cache_ttls: CacheTtlConfig,
}

impl WardenConfig {
    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `UPSTASH_REDIS_URL`, then `REDIS_URL`: remote store URL (unset = fallback only)
    /// - `WARDEN_STORE_CONNECT_TIMEOUT_MS` (default: 5000)
    /// - `WARDEN_STORE_OP_TIMEOUT_MS` (default: 5000)
    /// - `WARDEN_STORE_RETRY_INTERVAL_SECS` (default: 30)
    /// - `TESTING=true` or `RATE_LIMIT_ENABLED=false`: bypass rate limiting
    /// - `WARDEN_RATE_LIMIT_FAILURE_POLICY`: "open" or "closed" (default: open)
    /// - `WARDEN_RATE_LIMIT_EXPIRY_MARGIN_SECS` (default: 60)
    /// - `WARDEN_FALLBACK_CLEANUP_INTERVAL_SECS` (default: 60)
    /// - `WARDEN_FALLBACK_RETENTION_SECS` (default: 3600)
    /// - `WARDEN_CACHE_TTL_{PREDICTION,USER,ANALYTICS,HISTORY,MODEL_INFO}_SECS`
    /// - `WARDEN_POLICY_<NAME>`: limit such as "30/minute"
    ///
    /// Malformed numbers fall back to defaults; malformed policies and
    /// failure policies are reported.
    pub fn from_env() -> WardenResult<Self> {
        let vars: Vec<(String, String)> = std::env::vars().collect();
        Self::from_lookup(|key| std::env::var(key).ok(), &vars)
    }

    /// Build from an arbitrary lookup. `all` lists every available pair and
    /// is scanned for `WARDEN_POLICY_*` entries.
    pub fn from_lookup<F>(lookup: F, all: &[(String, String)]) -> WardenResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, default: u64| {
            Duration::from_millis(
                lookup(key)
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(default),
            )
        };
        let secs = |key: &str, default: u64| {
            lookup(key)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };

        let url = lookup("UPSTASH_REDIS_URL")
            .or_else(|| lookup("REDIS_URL"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let store = StoreConfig {
            url,
            connect_timeout: millis("WARDEN_STORE_CONNECT_TIMEOUT_MS", 5_000),
            operation_timeout: millis("WARDEN_STORE_OP_TIMEOUT_MS", 5_000),
            retry_interval: Duration::from_secs(secs("WARDEN_STORE_RETRY_INTERVAL_SECS", 30)),
        };

        let testing = lookup("TESTING")
            .map(|s| s.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let disabled = lookup("RATE_LIMIT_ENABLED")
            .map(|s| s.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(false);

        let failure_policy = match lookup("WARDEN_RATE_LIMIT_FAILURE_POLICY") {
            Some(raw) => raw.parse::<FailurePolicy>()?,
            None => FailurePolicy::Open,
        };

        let mut policies = PolicyTable::default();
        for (key, value) in all {
            if let Some(name) = key.strip_prefix("WARDEN_POLICY_") {
                let policy: RateLimitPolicy = value.parse()?;
                policies.insert(name, policy);
            }
        }

        let rate_limit = RateLimitConfig {
            bypass: testing || disabled,
            failure_policy,
            expiry_margin: Duration::from_secs(secs("WARDEN_RATE_LIMIT_EXPIRY_MARGIN_SECS", 60)),
            cleanup_interval: Duration::from_secs(secs(
                "WARDEN_FALLBACK_CLEANUP_INTERVAL_SECS",
                60,
            )),
            retention: Duration::from_secs(secs("WARDEN_FALLBACK_RETENTION_SECS", 3_600)),
            policies,
        };

        let defaults = CacheTtlConfig::default();
        let cache_ttls = CacheTtlConfig {
            prediction_secs: secs("WARDEN_CACHE_TTL_PREDICTION_SECS", defaults.prediction_secs),
            user_secs: secs("WARDEN_CACHE_TTL_USER_SECS", defaults.user_secs),
            analytics_secs: secs("WARDEN_CACHE_TTL_ANALYTICS_SECS", defaults.analytics_secs),
            history_secs: secs("WARDEN_CACHE_TTL_HISTORY_SECS", defaults.history_secs),
            model_info_secs: secs("WARDEN_CACHE_TTL_MODEL_INFO_SECS", defaults.model_info_secs),
        };

        let config = Self {
            store,
            rate_limit,
            cache_ttls,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> WardenResult<()> {
        let nonzero = |field: &str, value: Duration| -> Result<(), ConfigError> {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: format!("{:?}", value),
                    reason: format!("{field} must be positive"),
                });
            }
            Ok(())
        };

        nonzero("connect_timeout", self.store.connect_timeout)?;
        nonzero("operation_timeout", self.store.operation_timeout)?;
        nonzero("retry_interval", self.store.retry_interval)?;
        nonzero("cleanup_interval", self.rate_limit.cleanup_interval)?;
        nonzero("retention", self.rate_limit.retention)?;

        if let Some(url) = &self.store.url {
            if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
                return Err(ConfigError::InvalidValue {
                    field: "store.url".to_string(),
                    value: url.clone(),
                    reason: "expected a redis:// or rediss:// URL".to_string(),
                }
                .into());
            }
        }

        let ttls = [
            ("cache_ttls.prediction_secs", self.cache_ttls.prediction_secs),
            ("cache_ttls.user_secs", self.cache_ttls.user_secs),
            ("cache_ttls.analytics_secs", self.cache_ttls.analytics_secs),
            ("cache_ttls.history_secs", self.cache_ttls.history_secs),
            ("cache_ttls.model_info_secs", self.cache_ttls.model_info_secs),
        ];
        for (field, value) in ttls {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason: "cache TTLs must be at least one second".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_cache_ttls(mut self, cache_ttls: CacheTtlConfig) -> Self {
        self.cache_ttls = cache_ttls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WardenError;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> WardenResult<WardenConfig> {
        let all: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let map: HashMap<String, String> = all.iter().cloned().collect();
        WardenConfig::from_lookup(|k| map.get(k).cloned(), &all)
    }

    #[test]
    fn test_default_config() {
        let config = load(&[]).expect("empty environment should load");
        assert_eq!(config.store.url, None);
        assert_eq!(config.store.operation_timeout, Duration::from_secs(5));
        assert!(!config.rate_limit.bypass);
        assert_eq!(config.rate_limit.failure_policy, FailurePolicy::Open);
        assert_eq!(config.cache_ttls.prediction_secs, 600);
        assert_eq!(config.cache_ttls.history_secs, 180);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_upstash_url_preferred() {
        let config = load(&[
            ("REDIS_URL", "redis://localhost:6379/0"),
            ("UPSTASH_REDIS_URL", "rediss://default:pw@eu1.upstash.io:6379"),
        ])
        .expect("should load");
        assert_eq!(
            config.store.url.as_deref(),
            Some("rediss://default:pw@eu1.upstash.io:6379")
        );
    }

    #[test]
    fn test_bypass_flags() {
        assert!(load(&[("TESTING", "true")]).expect("load").rate_limit.bypass);
        assert!(load(&[("RATE_LIMIT_ENABLED", "FALSE")]).expect("load").rate_limit.bypass);
        assert!(!load(&[("TESTING", "no")]).expect("load").rate_limit.bypass);
    }

    #[test]
    fn test_policy_override() {
        let config = load(&[("WARDEN_POLICY_PREDICT", "60/minute")]).expect("should load");
        assert_eq!(
            config.rate_limit.policies.get("predict"),
            RateLimitPolicy::per_minute(60)
        );

        let err = load(&[("WARDEN_POLICY_LOGIN", "lots")]).expect_err("bad policy should fail");
        assert!(matches!(err, WardenError::Validation(_)));
    }

    #[test]
    fn test_failure_policy_closed() {
        let config =
            load(&[("WARDEN_RATE_LIMIT_FAILURE_POLICY", "closed")]).expect("should load");
        assert_eq!(config.rate_limit.failure_policy, FailurePolicy::Closed);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = load(&[("WARDEN_STORE_OP_TIMEOUT_MS", "0")]).expect_err("zero timeout");
        assert!(matches!(err, WardenError::Config(_)));
    }

    #[test]
    fn test_rejects_non_redis_url() {
        let err = load(&[("REDIS_URL", "memcached://localhost")]).expect_err("bad scheme");
        assert!(err.to_string().contains("store.url"));
    }

    #[test]
    fn test_rejects_zero_cache_ttl() {
        let err = load(&[("WARDEN_CACHE_TTL_USER_SECS", "0")]).expect_err("zero ttl");
        assert!(err.to_string().contains("user_secs"));
    }
}
