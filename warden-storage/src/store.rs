//! Resilient key-value store.
//!
//! [`KeyValueStore`] is the single entry point to storage for the rest of
//! the workspace. It holds an optional remote backend and a process-local
//! [`MemoryBackend`] fallback, and never hands a remote failure to its
//! caller: a failed remote call is logged and answered from the fallback.
//!
//! Layer rules:
//! - Reads come from the remote store when it answers, else the fallback.
//! - Writes go to the remote store; a failed write lands in the fallback.
//! - Deletes, expiries and flushes hit both layers, so an invalidated
//!   entry cannot resurface from the fallback during a later outage.
//! - A delete or flush the remote store missed is kept as a pending
//!   invalidation. Covered keys are never read from the remote store until
//!   the invalidation has been replayed there, which happens on the first
//!   remote call that gets through.
//!
//! The fallback is per process. Instances falling back at the same time do
//! not see each other's writes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use warden_core::{
    system_clock, BackendKind, KeyTtl, SharedClock, StoreConfig, StoreError, StoreInfo,
    StoreResult, Ttl,
};

use crate::backend::{StoreBackend, WindowOutcome, WindowRequest};
use crate::codec::{decode, encode};
use crate::memory::MemoryBackend;
use crate::pattern::glob_match;
use crate::redis_backend::RedisBackend;

// ============================================================================
// PENDING INVALIDATIONS
// ============================================================================

/// Invalidations the remote store has not applied yet.
#[derive(Debug, Default)]
struct PendingInvalidations {
    flushed: bool,
    keys: BTreeSet<String>,
    patterns: Vec<String>,
}

impl PendingInvalidations {
    fn is_empty(&self) -> bool {
        !self.flushed && self.keys.is_empty() && self.patterns.is_empty()
    }

    fn covers(&self, key: &str) -> bool {
        self.flushed
            || self.keys.contains(key)
            || self.patterns.iter().any(|p| glob_match(p, key))
    }

    fn record_pattern(&mut self, pattern: &str) {
        if !self.patterns.iter().any(|p| p == pattern) {
            self.patterns.push(pattern.to_string());
        }
    }

    /// Apply every recorded invalidation to `remote`. Entries are dropped
    /// as they land, so a replay cut short resumes where it stopped.
    async fn replay(&mut self, remote: &dyn StoreBackend) -> StoreResult<()> {
        if self.flushed {
            remote.flush().await?;
            *self = Self::default();
            return Ok(());
        }
        if !self.keys.is_empty() {
            let keys: Vec<String> = self.keys.iter().cloned().collect();
            remote.delete(&keys).await?;
            self.keys.clear();
        }
        while let Some(pattern) = self.patterns.last() {
            let matched = remote.keys(pattern).await?;
            if !matched.is_empty() {
                remote.delete(&matched).await?;
            }
            self.patterns.pop();
        }
        Ok(())
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Remote store with an in-process fallback.
#[derive(Debug)]
pub struct KeyValueStore {
    remote: Option<Arc<dyn StoreBackend>>,
    fallback: MemoryBackend,
    pending: Mutex<PendingInvalidations>,
    has_pending: AtomicBool,
    clock: SharedClock,
}

impl KeyValueStore {
    pub fn new(remote: Option<Arc<dyn StoreBackend>>, clock: SharedClock) -> Self {
        Self {
            remote,
            fallback: MemoryBackend::new(clock.clone()),
            pending: Mutex::new(PendingInvalidations::default()),
            has_pending: AtomicBool::new(false),
            clock,
        }
    }

    /// Store with no remote backend. Everything lives in this process.
    pub fn fallback_only(clock: SharedClock) -> Self {
        Self::new(None, clock)
    }

    /// Build the store described by `config`.
    ///
    /// Never fails: a missing URL, a malformed URL or an unreachable server
    /// all produce a usable store, with the reason logged.
    pub async fn connect(config: &StoreConfig, clock: SharedClock) -> Self {
        if config.url.is_none() {
            warn!("No remote store URL configured, using in-memory fallback");
            return Self::fallback_only(clock);
        }

        let backend = match RedisBackend::new(config) {
            Ok(backend) => backend,
            Err(e) => {
                error!(error = %e, "Invalid remote store configuration, using in-memory fallback");
                return Self::fallback_only(clock);
            }
        };

        match backend.ping().await {
            Ok(()) => info!(backend = ?backend.kind(), "Remote store reachable"),
            Err(e) => warn!(
                error = %e,
                "Remote store unreachable at startup, serving from fallback until it recovers"
            ),
        }

        Self::new(Some(Arc::new(backend)), clock)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// The process-local fallback layer.
    pub fn fallback(&self) -> &MemoryBackend {
        &self.fallback
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Whether an invalidation is waiting for the remote store.
    pub fn has_pending_invalidations(&self) -> bool {
        self.has_pending.load(Ordering::Acquire)
    }

    /// Ping the remote store. `false` when none is configured.
    pub async fn is_available(&self) -> bool {
        match &self.remote {
            Some(remote) => match remote.ping().await {
                Ok(()) => true,
                Err(e) => {
                    debug!(error = %e, "Remote store ping failed");
                    false
                }
            },
            None => false,
        }
    }

    /// Replay pending invalidations before a remote call.
    ///
    /// When the replay fails and `affected` says a pending invalidation
    /// touches the call, the replay error is returned and the caller must
    /// not use the remote store. Unaffected calls go ahead.
    async fn settle(
        &self,
        remote: &Arc<dyn StoreBackend>,
        affected: impl Fn(&PendingInvalidations) -> bool,
    ) -> StoreResult<()> {
        if !self.has_pending_invalidations() {
            return Ok(());
        }
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(());
        }
        match pending.replay(remote.as_ref()).await {
            Ok(()) => {
                self.has_pending.store(false, Ordering::Release);
                info!("Replayed invalidations missed while the remote store was unreachable");
                Ok(())
            }
            Err(e) if affected(&*pending) => Err(e),
            Err(e) => {
                debug!(error = %e, "Invalidation replay failed");
                Ok(())
            }
        }
    }

    /// Remember an invalidation the remote store missed.
    async fn defer(&self, record: impl FnOnce(&mut PendingInvalidations)) {
        let mut pending = self.pending.lock().await;
        record(&mut pending);
        self.has_pending.store(true, Ordering::Release);
    }

    /// Stored text for `key`, without JSON decoding.
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        if let Some(remote) = &self.remote {
            let result: StoreResult<_> = async {
                self.settle(remote, |p| p.covers(key)).await?;
                remote.get(key).await
            }
            .await;
            match result {
                Ok(value) => return value,
                Err(e) => warn!(key, error = %e, "Remote GET failed, reading fallback"),
            }
        }
        self.fallback.get(key).await.unwrap_or_else(|e| {
            debug!(key, error = %e, "Fallback GET failed");
            None
        })
    }

    /// Value for `key`, JSON-decoded when possible, else the raw string.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_raw(key).await.map(|raw| decode(&raw))
    }

    /// Value for `key` decoded into `T`. A stored value that does not fit
    /// `T` reads as absent.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(_) => match serde_json::from_value::<T>(Value::String(raw)) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(key, error = %e, "Stored value does not match requested type");
                    None
                }
            },
        }
    }

    /// Value written by [`set_json`](Self::set_json), parsed strictly as
    /// JSON. Text that is not JSON for `T` reads as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "Stored value is not JSON of the requested type");
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous value and expiry.
    ///
    /// Returns `true` when the remote store accepted the write. On `false`
    /// the value is still readable from the fallback unless it could not be
    /// encoded at all.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Ttl>) -> bool {
        match encode(value) {
            Ok(encoded) => self.set_encoded(key, &encoded, ttl).await,
            Err(e) => {
                error!(key, error = %e, "Value could not be encoded, not stored");
                false
            }
        }
    }

    /// Like [`set`](Self::set), but always stores the JSON text, strings
    /// included, so [`get_json`](Self::get_json) returns the value with its
    /// type intact.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Ttl>,
    ) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.set_encoded(key, &text, ttl).await,
            Err(e) => {
                error!(key, error = %e, "Value could not be serialized, not stored");
                false
            }
        }
    }

    async fn set_encoded(&self, key: &str, encoded: &str, ttl: Option<Ttl>) -> bool {
        if let Some(remote) = &self.remote {
            let result: StoreResult<_> = async {
                self.settle(remote, |p| p.covers(key)).await?;
                remote.set(key, encoded, ttl).await
            }
            .await;
            match result {
                Ok(()) => {
                    // Keep an older outage-era copy from resurfacing later.
                    if let Err(e) = self.fallback.delete(&[key.to_string()]).await {
                        debug!(key, error = %e, "Fallback DEL failed");
                    }
                    return true;
                }
                Err(e) => warn!(key, error = %e, "Remote SET failed, writing fallback"),
            }
        }

        if let Err(e) = self.fallback.set(key, encoded, ttl).await {
            error!(key, error = %e, "Fallback SET failed");
        }
        false
    }

    /// Delete `keys` from both layers. Returns the remote count when the
    /// remote store answered, else the fallback count.
    ///
    /// Keys the remote store could not delete stay invalidated: they are
    /// not read from it again until the delete has been replayed.
    pub async fn delete<K: AsRef<str>>(&self, keys: &[K]) -> u64 {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        if keys.is_empty() {
            return 0;
        }

        let local = self.fallback.delete(&keys).await.unwrap_or(0);
        if let Some(remote) = &self.remote {
            let result: StoreResult<_> = async {
                self.settle(remote, |_| true).await?;
                remote.delete(&keys).await
            }
            .await;
            match result {
                Ok(removed) => return removed,
                Err(e) => {
                    warn!(
                        count = keys.len(),
                        error = %e,
                        "Remote DEL failed, deferring until the store recovers"
                    );
                    self.defer(|p| p.keys.extend(keys.iter().cloned())).await;
                }
            }
        }
        local
    }

    pub async fn exists<K: AsRef<str>>(&self, keys: &[K]) -> u64 {
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        if let Some(remote) = &self.remote {
            let result: StoreResult<_> = async {
                self.settle(remote, |p| keys.iter().any(|k| p.covers(k))).await?;
                remote.exists(&keys).await
            }
            .await;
            match result {
                Ok(found) => return found,
                Err(e) => warn!(error = %e, "Remote EXISTS failed, checking fallback"),
            }
        }
        self.fallback.exists(&keys).await.unwrap_or(0)
    }

    /// Add `by` to the integer at `key`. `None` when the stored value is not
    /// an integer.
    pub async fn increment(&self, key: &str, by: i64) -> Option<i64> {
        if let Some(remote) = &self.remote {
            let result: StoreResult<_> = async {
                self.settle(remote, |p| p.covers(key)).await?;
                remote.incr_by(key, by).await
            }
            .await;
            match result {
                Ok(value) => return Some(value),
                Err(e) if e.is_transient() => {
                    warn!(key, error = %e, "Remote INCRBY failed, incrementing fallback")
                }
                Err(e) => {
                    warn!(key, error = %e, "Remote INCRBY rejected");
                    return None;
                }
            }
        }
        match self.fallback.incr_by(key, by).await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Fallback INCRBY rejected");
                None
            }
        }
    }

    /// Set the expiry of `key` in both layers. `true` when the key exists in
    /// the answering layer.
    pub async fn expire(&self, key: &str, ttl: Ttl) -> bool {
        let local = self.fallback.expire(key, ttl).await.unwrap_or(false);
        if let Some(remote) = &self.remote {
            let result: StoreResult<_> = async {
                self.settle(remote, |p| p.covers(key)).await?;
                remote.expire(key, ttl).await
            }
            .await;
            match result {
                Ok(applied) => return applied,
                Err(e) => warn!(key, error = %e, "Remote EXPIRE failed"),
            }
        }
        local
    }

    pub async fn ttl(&self, key: &str) -> KeyTtl {
        if let Some(remote) = &self.remote {
            let result: StoreResult<_> = async {
                self.settle(remote, |p| p.covers(key)).await?;
                remote.ttl(key).await
            }
            .await;
            match result {
                Ok(ttl) => return ttl,
                Err(e) => warn!(key, error = %e, "Remote TTL failed, checking fallback"),
            }
        }
        self.fallback.ttl(key).await.unwrap_or(KeyTtl::Missing)
    }

    /// Keys matching a Redis glob. Identical semantics in both layers.
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if let Some(remote) = &self.remote {
            let result: StoreResult<_> = async {
                self.settle(remote, |_| true).await?;
                remote.keys(pattern).await
            }
            .await;
            match result {
                Ok(keys) => return keys,
                Err(e) => warn!(pattern, error = %e, "Remote KEYS failed, listing fallback"),
            }
        }
        self.fallback.keys(pattern).await.unwrap_or_default()
    }

    /// Delete every key matching `pattern` from both layers. Returns the
    /// remote count when the remote store answered, else the fallback count.
    ///
    /// A pattern the remote store could not apply is kept and replayed the
    /// same way [`delete`](Self::delete) keeps keys.
    pub async fn delete_matching(&self, pattern: &str) -> u64 {
        let local_keys = self.fallback.keys(pattern).await.unwrap_or_default();
        let local = if local_keys.is_empty() {
            0
        } else {
            self.fallback.delete(&local_keys).await.unwrap_or(0)
        };

        let removed = match &self.remote {
            Some(remote) => {
                let result: StoreResult<_> = async {
                    self.settle(remote, |_| true).await?;
                    let keys = remote.keys(pattern).await?;
                    if keys.is_empty() {
                        return Ok(0);
                    }
                    remote.delete(&keys).await
                }
                .await;
                match result {
                    Ok(removed) => removed,
                    Err(e) => {
                        warn!(
                            pattern,
                            error = %e,
                            "Remote pattern delete failed, deferring until the store recovers"
                        );
                        self.defer(|p| p.record_pattern(pattern)).await;
                        local
                    }
                }
            }
            None => local,
        };
        info!(pattern, removed, "Deleted keys matching pattern");
        removed
    }

    /// Remove every key from both layers. `false` when the remote flush
    /// failed; the flush is then replayed once the remote store answers.
    pub async fn flush(&self) -> bool {
        self.fallback.clear().await;
        let Some(remote) = &self.remote else {
            return true;
        };
        match remote.flush().await {
            Ok(()) => {
                let mut pending = self.pending.lock().await;
                *pending = PendingInvalidations::default();
                self.has_pending.store(false, Ordering::Release);
                true
            }
            Err(e) => {
                error!(error = %e, "Remote FLUSHDB failed, deferring until the store recovers");
                self.defer(|p| p.flushed = true).await;
                false
            }
        }
    }

    /// Report on the layer currently answering.
    pub async fn info(&self) -> StoreInfo {
        let Some(remote) = &self.remote else {
            return StoreInfo::fallback(self.fallback.len().await as u64);
        };
        match remote.info().await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Remote INFO failed");
                let mut info = StoreInfo::error(remote.kind(), e.to_string());
                info.total_keys = self.fallback.len().await as u64;
                info
            }
        }
    }

    /// Kind of the configured remote backend, if any.
    pub fn remote_kind(&self) -> Option<BackendKind> {
        self.remote.as_ref().map(|r| r.kind())
    }

    /// Atomic sliding-window admission against the remote store.
    ///
    /// Errors are returned rather than absorbed: the rate limiter owns the
    /// decision of what a failed admission means. A window whose delete has
    /// not reached the remote store yet reports the replay error.
    pub async fn window_admit(
        &self,
        key: &str,
        request: &WindowRequest,
    ) -> StoreResult<WindowOutcome> {
        match &self.remote {
            Some(remote) => {
                self.settle(remote, |p| p.covers(key)).await?;
                remote.window_admit(key, request).await
            }
            None => Err(StoreError::NotConfigured),
        }
    }

    /// Atomic prune-and-count against the remote store.
    pub async fn window_peek(
        &self,
        key: &str,
        now: i64,
        window_secs: u64,
    ) -> StoreResult<WindowOutcome> {
        match &self.remote {
            Some(remote) => {
                self.settle(remote, |p| p.covers(key)).await?;
                remote.window_peek(key, now, window_secs).await
            }
            None => Err(StoreError::NotConfigured),
        }
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::fallback_only(system_clock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use warden_core::{ManualClock, StoreStatus};

    fn ttl(secs: u64) -> Ttl {
        Ttl::secs(secs).expect("valid ttl")
    }

    /// Store whose "remote" is a second in-memory backend, so both layers
    /// can be inspected.
    fn layered() -> (KeyValueStore, Arc<MemoryBackend>, ManualClock) {
        let clock = ManualClock::default();
        let remote = Arc::new(MemoryBackend::new(clock.shared()));
        let store = KeyValueStore::new(Some(remote.clone()), clock.shared());
        (store, remote, clock)
    }

    #[tokio::test]
    async fn test_fallback_only_roundtrip() {
        let store = KeyValueStore::fallback_only(ManualClock::default().shared());
        assert!(!store.is_available().await);
        assert!(!store.set("user:1", &json!({"id": 1}), None).await);
        assert_eq!(store.get("user:1").await, Some(json!({"id": 1})));
        assert_eq!(store.exists(&["user:1"]).await, 1);
    }

    #[tokio::test]
    async fn test_remote_write_reports_success() {
        let (store, remote, _) = layered();
        assert!(store.is_available().await);
        assert!(store.set("k", "v", None).await);
        assert_eq!(remote.get("k").await.expect("get"), Some("v".to_string()));
        assert!(store.fallback().is_empty().await);
    }

    #[tokio::test]
    async fn test_strings_stored_raw_and_json_decoded() {
        let (store, remote, _) = layered();
        store.set("s", "plain", None).await;
        store.set("n", &42, None).await;
        assert_eq!(remote.get("s").await.expect("get").as_deref(), Some("plain"));
        assert_eq!(store.get("s").await, Some(json!("plain")));
        assert_eq!(store.get("n").await, Some(json!(42)));
        assert_eq!(store.get_raw("n").await.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_json_strings_keep_their_type() {
        let (store, remote, _) = layered();
        for text in ["42", "true", "null", "[1]", "plain"] {
            assert!(store.set_json("s", text, None).await);
            assert_eq!(store.get_json::<Value>("s").await, Some(json!(text)));
        }
        assert_eq!(remote.get("s").await.expect("get").as_deref(), Some("\"plain\""));

        store.set("raw", "not json", None).await;
        assert_eq!(store.get_json::<Value>("raw").await, None);
    }

    #[tokio::test]
    async fn test_pending_invalidations_cover_and_replay() {
        let (_, remote, _) = layered();
        for key in ["user:1", "prediction:C1:a", "prediction:C2:a"] {
            remote.set(key, "v", None).await.expect("set");
        }

        let mut pending = PendingInvalidations::default();
        assert!(pending.is_empty());
        pending.keys.insert("user:1".to_string());
        pending.record_pattern("prediction:C1:*");
        pending.record_pattern("prediction:C1:*");
        assert_eq!(pending.patterns.len(), 1);
        assert!(pending.covers("user:1"));
        assert!(pending.covers("prediction:C1:a"));
        assert!(!pending.covers("prediction:C2:a"));

        pending.replay(remote.as_ref()).await.expect("replay");
        assert!(pending.is_empty());
        assert_eq!(remote.keys("*").await.expect("keys"), vec!["prediction:C2:a".to_string()]);
    }

    #[tokio::test]
    async fn test_pending_flush_covers_everything() {
        let (_, remote, _) = layered();
        remote.set("a", "1", None).await.expect("set");
        let pending = PendingInvalidations {
            flushed: true,
            ..PendingInvalidations::default()
        };
        assert!(pending.covers("anything"));

        let mut pending = pending;
        pending.replay(remote.as_ref()).await.expect("replay");
        assert!(pending.is_empty());
        assert!(remote.is_empty().await);
    }

    #[tokio::test]
    async fn test_get_as_typed() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct User {
            id: u32,
            email: String,
        }

        let (store, _, _) = layered();
        let user = User {
            id: 7,
            email: "a@b.c".into(),
        };
        store.set("user:7", &user, None).await;
        assert_eq!(store.get_as::<User>("user:7").await, Some(user));

        store.set("greeting", "hello", None).await;
        assert_eq!(store.get_as::<String>("greeting").await.as_deref(), Some("hello"));
        assert_eq!(store.get_as::<User>("greeting").await, None);
    }

    #[tokio::test]
    async fn test_ttl_expiry_via_clock() {
        let (store, _, clock) = layered();
        store.set("k", "v", Some(ttl(300))).await;
        assert_eq!(store.ttl("k").await, KeyTtl::Expires(Duration::from_secs(300)));
        clock.advance_secs(300);
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.ttl("k").await, KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_delete_hits_both_layers() {
        let (store, remote, _) = layered();
        store.fallback().set("k", "stale", None).await.expect("set");
        remote.set("k", "fresh", None).await.expect("set");

        assert_eq!(store.delete(&["k"]).await, 1);
        assert!(store.fallback().is_empty().await);
        assert!(remote.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_matching_covers_fallback_only_keys() {
        let (store, remote, _) = layered();
        remote.set("prediction:C1:a", "1", None).await.expect("set");
        store
            .fallback()
            .set("prediction:C1:b", "2", None)
            .await
            .expect("set");
        remote.set("prediction:C2:a", "3", None).await.expect("set");

        store.delete_matching("prediction:C1:*").await;
        assert!(store.fallback().is_empty().await);
        assert_eq!(store.keys("prediction:*").await, vec!["prediction:C2:a".to_string()]);
    }

    #[tokio::test]
    async fn test_increment() {
        let (store, _, _) = layered();
        assert_eq!(store.increment("hits", 1).await, Some(1));
        assert_eq!(store.increment("hits", 4).await, Some(5));
        store.set("name", "bob", None).await;
        assert_eq!(store.increment("name", 1).await, None);
    }

    #[tokio::test]
    async fn test_expire_and_ttl_sentinels() {
        let (store, _, _) = layered();
        assert!(!store.expire("missing", ttl(10)).await);
        assert_eq!(store.ttl("missing").await.as_redis_secs(), -2);

        store.set("k", "v", None).await;
        assert_eq!(store.ttl("k").await.as_redis_secs(), -1);
        assert!(store.expire("k", ttl(10)).await);
        assert_eq!(store.ttl("k").await.as_redis_secs(), 10);
    }

    #[tokio::test]
    async fn test_flush_clears_both_layers() {
        let (store, remote, _) = layered();
        store.fallback().set("a", "1", None).await.expect("set");
        remote.set("b", "2", None).await.expect("set");
        assert!(store.flush().await);
        assert!(store.fallback().is_empty().await);
        assert!(remote.is_empty().await);
    }

    #[tokio::test]
    async fn test_info_reports_layer() {
        let store = KeyValueStore::fallback_only(ManualClock::default().shared());
        store.set("a", "1", None).await;
        let info = store.info().await;
        assert_eq!(info.status, StoreStatus::Fallback);
        assert_eq!(info.total_keys, 1);
        assert_eq!(store.remote_kind(), None);
    }

    #[tokio::test]
    async fn test_window_requires_remote() {
        let store = KeyValueStore::fallback_only(ManualClock::default().shared());
        let request = WindowRequest::new(0, 60, 1, ttl(120));
        assert_eq!(
            store.window_admit("ratelimit:x", &request).await,
            Err(StoreError::NotConfigured)
        );
        assert_eq!(
            store.window_peek("ratelimit:x", 0, 60).await,
            Err(StoreError::NotConfigured)
        );
    }

    #[tokio::test]
    async fn test_connect_without_url_is_fallback_only() {
        let store = KeyValueStore::connect(&StoreConfig::default(), system_clock()).await;
        assert!(!store.has_remote());
    }

    #[tokio::test]
    async fn test_connect_with_bad_url_is_fallback_only() {
        let config = StoreConfig::default().with_url("definitely not a url");
        let store = KeyValueStore::connect(&config, system_clock()).await;
        assert!(!store.has_remote());
        assert!(!store.set("k", "v", None).await);
        assert_eq!(store.get("k").await, Some(json!("v")));
    }
}
