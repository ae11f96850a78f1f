//! Domain cache.
//!
//! Typed get/set/invalidate per entity class on top of the shared
//! [`KeyValueStore`]. Every write carries its namespace TTL. Invalidations
//! delete from both store layers, so an invalidated entry is not served
//! again even if the remote store later becomes unreachable.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::StoreInfo;
use warden_storage::KeyValueStore;

use crate::namespace::{
    history_pattern, predictions_pattern, CacheKey, CacheNamespace, CacheTtls, KeyCounts,
};

/// Snapshot of what the store holds, grouped by namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_keys: u64,
    pub by_type: KeyCounts,
    pub store_info: StoreInfo,
}

/// Typed caching facade for the service's entity classes.
#[derive(Debug, Clone)]
pub struct DomainCache {
    store: Arc<KeyValueStore>,
    ttls: CacheTtls,
}

impl DomainCache {
    pub fn new(store: Arc<KeyValueStore>, ttls: CacheTtls) -> Self {
        Self { store, ttls }
    }

    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    // ========================================================================
    // GENERIC ACCESS
    // ========================================================================

    /// Read `key` as `T`. Values that do not decode as `T` read as absent.
    ///
    /// Entries are JSON text, strings included, so a cached `"42"` string
    /// comes back as that string and not as a number.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let value = self.store.get_json::<T>(key.as_str()).await;
        debug!(key = %key, hit = value.is_some(), "Cache lookup");
        value
    }

    /// Write `value` under `key` with the namespace TTL.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &CacheKey, value: &T) -> bool {
        let ttl = key.namespace().ttl(&self.ttls);
        let stored = self.store.set_json(key.as_str(), value, Some(ttl)).await;
        debug!(key = %key, ttl = ttl.as_secs(), remote = stored, "Cached value");
        stored
    }

    /// Drop one key.
    pub async fn evict(&self, key: &CacheKey) -> u64 {
        self.store.delete(&[key.as_str()]).await
    }

    /// Delete every key matching a glob pattern.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        self.store.delete_matching(pattern).await
    }

    // ========================================================================
    // PREDICTIONS
    // ========================================================================

    pub async fn get_prediction(&self, customer_id: &str, input_hash: &str) -> Option<Value> {
        self.fetch(&CacheKey::prediction(customer_id, input_hash)).await
    }

    pub async fn set_prediction<T: Serialize + ?Sized>(
        &self,
        customer_id: &str,
        input_hash: &str,
        prediction: &T,
    ) -> bool {
        self.put(&CacheKey::prediction(customer_id, input_hash), prediction)
            .await
    }

    /// Invalidate one customer's predictions, or all predictions.
    pub async fn invalidate_predictions(&self, customer_id: Option<&str>) -> u64 {
        self.invalidate_pattern(&predictions_pattern(customer_id))
            .await
    }

    // ========================================================================
    // USERS
    // ========================================================================

    pub async fn get_user(&self, user_id: impl fmt::Display) -> Option<Value> {
        self.fetch(&CacheKey::user(user_id)).await
    }

    pub async fn set_user<T: Serialize + ?Sized>(
        &self,
        user_id: impl fmt::Display,
        user: &T,
    ) -> bool {
        self.put(&CacheKey::user(user_id), user).await
    }

    pub async fn invalidate_user(&self, user_id: impl fmt::Display) -> u64 {
        self.evict(&CacheKey::user(user_id)).await
    }

    // ========================================================================
    // ANALYTICS
    // ========================================================================

    pub async fn get_analytics(&self, kind: &str) -> Option<Value> {
        self.fetch(&CacheKey::analytics(kind)).await
    }

    pub async fn set_analytics<T: Serialize + ?Sized>(&self, kind: &str, data: &T) -> bool {
        self.put(&CacheKey::analytics(kind), data).await
    }

    pub async fn invalidate_analytics(&self) -> u64 {
        self.invalidate_pattern(&CacheNamespace::Analytics.pattern())
            .await
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    pub async fn get_history(&self, user_id: impl fmt::Display, limit: u32) -> Option<Value> {
        self.fetch(&CacheKey::history(user_id, limit)).await
    }

    pub async fn set_history<T: Serialize + ?Sized>(
        &self,
        user_id: impl fmt::Display,
        limit: u32,
        history: &T,
    ) -> bool {
        self.put(&CacheKey::history(user_id, limit), history).await
    }

    /// Invalidate every page of one user's history, or all history.
    pub async fn invalidate_history(&self, user_id: Option<&dyn fmt::Display>) -> u64 {
        let user_id = user_id.map(|id| id.to_string());
        self.invalidate_pattern(&history_pattern(user_id.as_deref()))
            .await
    }

    // ========================================================================
    // MODEL INFO
    // ========================================================================

    pub async fn get_model_info(&self) -> Option<Value> {
        self.fetch(&CacheKey::model_info()).await
    }

    pub async fn set_model_info<T: Serialize + ?Sized>(&self, info: &T) -> bool {
        self.put(&CacheKey::model_info(), info).await
    }

    pub async fn invalidate_model_info(&self) -> u64 {
        self.evict(&CacheKey::model_info()).await
    }

    // ========================================================================
    // WHOLE STORE
    // ========================================================================

    /// Flush the entire store, rate-limit windows included. Not for request
    /// paths.
    pub async fn invalidate_all(&self) -> bool {
        warn!("Invalidating ALL cached data");
        let flushed = self.store.flush().await;
        info!(flushed, "Cache flush finished");
        flushed
    }

    /// Count keys per namespace. Read-only.
    pub async fn cache_stats(&self) -> CacheStats {
        let keys = self.store.keys("*").await;
        let by_type: KeyCounts = keys.iter().map(String::as_str).collect();
        CacheStats {
            total_keys: keys.len() as u64,
            by_type,
            store_info: self.store.info().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::input_hash;
    use serde_json::json;
    use warden_core::{ManualClock, StoreStatus};
    use warden_storage::MemoryBackend;

    fn cache() -> (DomainCache, ManualClock) {
        let clock = ManualClock::default();
        let remote = Arc::new(MemoryBackend::new(clock.shared()));
        let store = Arc::new(KeyValueStore::new(Some(remote), clock.shared()));
        (DomainCache::new(store, CacheTtls::default()), clock)
    }

    #[tokio::test]
    async fn test_prediction_roundtrip_by_input_hash() {
        let (cache, _) = cache();
        let prediction = json!({
            "customer_id": "TEST001",
            "prediction": 1,
            "churn_probability": 0.82,
        });
        let hash = input_hash(&json!({"test": "data"})).expect("hash");

        assert!(cache.set_prediction("TEST001", &hash, &prediction).await);
        assert_eq!(cache.get_prediction("TEST001", &hash).await, Some(prediction));

        let other = input_hash(&json!({"test": "other"})).expect("hash");
        assert_eq!(cache.get_prediction("TEST001", &other).await, None);
    }

    #[tokio::test]
    async fn test_namespace_ttls_apply() {
        let (cache, clock) = cache();
        cache.set_user(1, &json!({"id": 1})).await;
        cache.set_history(1, 50, &json!([1, 2])).await;
        cache.set_model_info(&json!({"version": "1.0"})).await;

        clock.advance_secs(180);
        assert!(cache.get_history(1, 50).await.is_none());
        assert!(cache.get_user(1).await.is_some());

        clock.advance_secs(120);
        assert!(cache.get_user(1).await.is_none());
        assert!(cache.get_model_info().await.is_some());

        clock.advance_secs(3_300);
        assert!(cache.get_model_info().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_predictions_by_customer() {
        let (cache, _) = cache();
        cache.set_prediction("C1", "h1", &json!({"p": 1})).await;
        cache.set_prediction("C1", "h2", &json!({"p": 2})).await;
        cache.set_prediction("C2", "h1", &json!({"p": 3})).await;

        assert_eq!(cache.invalidate_predictions(Some("C1")).await, 2);
        assert!(cache.get_prediction("C1", "h1").await.is_none());
        assert!(cache.get_prediction("C1", "h2").await.is_none());
        assert_eq!(cache.get_prediction("C2", "h1").await, Some(json!({"p": 3})));

        assert_eq!(cache.invalidate_predictions(None).await, 1);
        assert!(cache.get_prediction("C2", "h1").await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_history_scoped_and_global() {
        let (cache, _) = cache();
        cache.set_history(7, 10, &json!([])).await;
        cache.set_history(7, 50, &json!([])).await;
        cache.set_history(70, 10, &json!([])).await;

        assert_eq!(cache.invalidate_history(Some(&7)).await, 2);
        assert!(cache.get_history(70, 10).await.is_some());
        assert_eq!(cache.invalidate_history(None).await, 1);
    }

    #[tokio::test]
    async fn test_single_key_invalidations() {
        let (cache, _) = cache();
        cache.set_user(5, &json!({"id": 5})).await;
        cache.set_analytics("summary", &json!({"total": 3})).await;
        cache.set_analytics("daily", &json!([])).await;
        cache.set_model_info(&json!({})).await;

        assert_eq!(cache.invalidate_user(5).await, 1);
        assert_eq!(cache.invalidate_analytics().await, 2);
        assert_eq!(cache.invalidate_model_info().await, 1);
        assert_eq!(cache.cache_stats().await.total_keys, 0);
    }

    #[tokio::test]
    async fn test_json_like_strings_keep_their_type() {
        let (cache, _) = cache();
        for text in ["42", "true", "null", "[1]", "{\"a\":1}"] {
            cache.set_analytics("label", text).await;
            assert_eq!(cache.get_analytics("label").await, Some(json!(text)));
            assert_eq!(
                cache.fetch::<String>(&CacheKey::analytics("label")).await.as_deref(),
                Some(text)
            );
        }
    }

    #[tokio::test]
    async fn test_typed_fetch() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Summary {
            total_predictions: u64,
            churn_rate: f64,
        }

        let (cache, _) = cache();
        let summary = Summary {
            total_predictions: 10,
            churn_rate: 0.5,
        };
        let key = CacheKey::analytics("summary");
        cache.put(&key, &summary).await;
        assert_eq!(cache.fetch::<Summary>(&key).await, Some(summary));
        assert_eq!(cache.fetch::<Vec<u8>>(&key).await, None);
    }

    #[tokio::test]
    async fn test_cache_stats_buckets() {
        let (cache, _) = cache();
        cache.set_prediction("C1", "h", &json!({})).await;
        cache.set_user(1, &json!({})).await;
        cache.set_model_info(&json!({})).await;
        cache.store().set("ratelimit:1.2.3.4", "x", None).await;
        cache.store().set("session:abc", "x", None).await;

        let stats = cache.cache_stats().await;
        assert_eq!(stats.total_keys, 5);
        assert_eq!(stats.by_type.predictions, 1);
        assert_eq!(stats.by_type.users, 1);
        assert_eq!(stats.by_type.model_info, 1);
        assert_eq!(stats.by_type.ratelimit, 1);
        assert_eq!(stats.by_type.other, 1);
        assert_eq!(stats.store_info.total_keys, 5);

        // Observing does not change anything.
        assert_eq!(cache.cache_stats().await, stats);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let (cache, _) = cache();
        cache.set_user(1, &json!({})).await;
        assert!(cache.invalidate_all().await);
        assert!(cache.get_user(1).await.is_none());
    }

    #[tokio::test]
    async fn test_fallback_only_cache_still_works() {
        let store = Arc::new(KeyValueStore::fallback_only(ManualClock::default().shared()));
        let cache = DomainCache::new(store, CacheTtls::default());
        assert!(!cache.set_user(1, &json!({"id": 1})).await);
        assert_eq!(cache.get_user(1).await, Some(json!({"id": 1})));
        assert_eq!(cache.cache_stats().await.store_info.status, StoreStatus::Fallback);
    }
}
