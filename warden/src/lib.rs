//! Warden - degrading request governance
//!
//! One shared [`KeyValueStore`] feeds a [`RateLimiter`] and a
//! [`DomainCache`]. The store talks to Redis when a URL is configured and
//! falls back to an in-process map whenever Redis cannot answer, so both
//! components keep working through an outage.
//!
//! ```no_run
//! # async fn run() -> warden::WardenResult<()> {
//! let warden = warden::Warden::connect(warden::WardenConfig::from_env()?).await?;
//! if warden.limiter().is_allowed("203.0.113.7", 10, 60).await? {
//!     let cached = warden.cache().get_user(42).await;
//!     # let _ = cached;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Fallback state is per process: during an outage each instance enforces
//! limits on its own and cannot see values other instances cached.

pub mod telemetry;

pub use warden_cache::{
    input_hash, CacheKey, CacheNamespace, CacheStats, CacheTtls, CachedFn, DomainCache,
};
pub use warden_core::{
    FailurePolicy, HealthCheck, HealthStatus, RateLimitConfig, RateLimitPolicy, StoreConfig,
    StoreInfo, StoreStatus, WardenConfig, WardenError, WardenResult,
};
pub use warden_limit::{RateLimitDecision, RateLimitHeaders, RateLimitKey, RateLimiter};
pub use warden_storage::KeyValueStore;

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use warden_core::system_clock;

const HEALTH_COMPONENT: &str = "store";

/// The composed limiter and cache over one store.
#[derive(Debug, Clone)]
pub struct Warden {
    config: WardenConfig,
    store: Arc<KeyValueStore>,
    limiter: Arc<RateLimiter>,
    cache: Arc<DomainCache>,
}

impl Warden {
    /// Validate `config`, connect the store, and build both components.
    ///
    /// An unreachable store is not an error; the components start on the
    /// fallback and move to the remote store once it answers.
    pub async fn connect(config: WardenConfig) -> WardenResult<Self> {
        config.validate()?;
        let store = Arc::new(KeyValueStore::connect(&config.store, system_clock()).await);
        Self::with_store(config, store)
    }

    /// Build on an existing store, for callers that construct their own
    /// backend or clock.
    pub fn with_store(config: WardenConfig, store: Arc<KeyValueStore>) -> WardenResult<Self> {
        config.validate()?;
        let ttls = CacheTtls::from_config(&config.cache_ttls)?;
        let limiter = Arc::new(RateLimiter::new(store.clone(), config.rate_limit.clone()));
        let cache = Arc::new(DomainCache::new(store.clone(), ttls));

        info!(
            remote = ?store.remote_kind(),
            bypass = config.rate_limit.bypass,
            failure_policy = ?config.rate_limit.failure_policy,
            "Warden ready"
        );

        Ok(Self {
            config,
            store,
            limiter,
            cache,
        })
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<DomainCache> {
        &self.cache
    }

    /// Healthy while the remote store answers, degraded while serving from
    /// the fallback.
    pub async fn health(&self) -> HealthCheck {
        let started = Instant::now();
        let info = self.store.info().await;
        let elapsed = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        let check = match info.health_status() {
            HealthStatus::Healthy => HealthCheck::healthy(HEALTH_COMPONENT),
            HealthStatus::Degraded => {
                let reason = match info.error.as_deref() {
                    Some(error) => format!(
                        "Remote store unreachable; serving from in-process fallback: {error}"
                    ),
                    None => {
                        "No remote store configured; serving from in-process fallback".to_string()
                    }
                };
                HealthCheck::degraded(HEALTH_COMPONENT, reason)
            }
        };

        check
            .with_response_time(elapsed)
            .with_metadata("backend", json!(info.backend))
            .with_metadata("total_keys", json!(info.total_keys))
            .with_metadata("rate_limit_bypass", json!(self.limiter.is_bypassed()))
            .with_metadata("rate_limit_local", json!(self.limiter.is_degraded()))
            .with_metadata(
                "pending_invalidations",
                json!(self.store.has_pending_invalidations()),
            )
    }
}
