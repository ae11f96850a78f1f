//! Warden Test Utilities
//!
//! Shared test infrastructure for the warden workspace:
//! - `FlakyBackend`, a store backend whose outage can be switched on mid-test
//! - Proptest generators for identities, keys, policies and JSON values
//! - Fixtures wiring a `KeyValueStore` to a manual clock
//! - Assertions for store results

pub use warden_core::{
    KeyTtl, ManualClock, RateLimitPolicy, StoreError, StoreInfo, StoreResult, StoreStatus, Ttl,
};
pub use warden_storage::{KeyValueStore, MemoryBackend, StoreBackend};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use warden_core::BackendKind;
use warden_storage::{WindowOutcome, WindowRequest};

// ============================================================================
// FLAKY BACKEND
// ============================================================================

/// In-memory backend that pretends to be a remote store and can be taken
/// down. While down, every call fails with a connection error and the data
/// is kept, so bringing it back up resumes where it left off.
#[derive(Debug)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    available: AtomicBool,
    failures: AtomicU64,
}

impl FlakyBackend {
    pub fn new(clock: &ManualClock) -> Self {
        Self {
            inner: MemoryBackend::new(clock.shared()),
            available: AtomicBool::new(true),
            failures: AtomicU64::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn go_down(&self) {
        self.set_available(false);
    }

    pub fn come_up(&self) {
        self.set_available(true);
    }

    pub fn is_up(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Calls rejected while down.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// The data behind the outage switch.
    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    fn gate(&self, operation: &str) -> StoreResult<()> {
        if self.is_up() {
            return Ok(());
        }
        self.failures.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::connection(format!(
            "{operation}: simulated outage"
        )))
    }
}

#[async_trait]
impl StoreBackend for FlakyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn ping(&self) -> StoreResult<()> {
        self.gate("PING")
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.gate("GET")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Ttl>) -> StoreResult<()> {
        self.gate("SET")?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.gate("DEL")?;
        self.inner.delete(keys).await
    }

    async fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        self.gate("EXISTS")?;
        self.inner.exists(keys).await
    }

    async fn incr_by(&self, key: &str, by: i64) -> StoreResult<i64> {
        self.gate("INCRBY")?;
        self.inner.incr_by(key, by).await
    }

    async fn expire(&self, key: &str, ttl: Ttl) -> StoreResult<bool> {
        self.gate("EXPIRE")?;
        self.inner.expire(key, ttl).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        self.gate("TTL")?;
        self.inner.ttl(key).await
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.gate("KEYS")?;
        self.inner.keys(pattern).await
    }

    async fn flush(&self) -> StoreResult<()> {
        self.gate("FLUSHDB")?;
        self.inner.flush().await
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        self.gate("INFO")?;
        let mut info = self.inner.info().await?;
        info.status = StoreStatus::Connected;
        info.backend = BackendKind::Redis;
        Ok(info)
    }

    async fn window_admit(
        &self,
        key: &str,
        request: &WindowRequest,
    ) -> StoreResult<WindowOutcome> {
        self.gate("EVALSHA")?;
        self.inner.window_admit(key, request).await
    }

    async fn window_peek(
        &self,
        key: &str,
        now: i64,
        window_secs: u64,
    ) -> StoreResult<WindowOutcome> {
        self.gate("MULTI")?;
        self.inner.window_peek(key, now, window_secs).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for warden inputs.

    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map, Value};

    /// A client identity as the limiter sees it: an IPv4 address or a user.
    pub fn arb_identity() -> impl Strategy<Value = String> {
        prop_oneof![
            any::<[u8; 4]>().prop_map(|o| format!("{}.{}.{}.{}", o[0], o[1], o[2], o[3])),
            "[a-z0-9]{1,10}".prop_map(|id| format!("user:{id}")),
        ]
    }

    /// An identifier segment, including glob metacharacters.
    pub fn arb_key_segment() -> impl Strategy<Value = String> {
        prop_oneof![
            4 => "[A-Za-z0-9_-]{1,12}",
            1 => "[A-Za-z0-9*?\\[\\]]{1,8}",
        ]
    }

    /// A policy small enough to exhaust in a test.
    pub fn arb_policy() -> impl Strategy<Value = RateLimitPolicy> {
        (0u32..20, 1u64..600).prop_map(|(max, window)| {
            RateLimitPolicy::new(max, window).unwrap_or(RateLimitPolicy::per_minute(max))
        })
    }

    fn arb_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[ -~]{0,16}".prop_map(Value::String),
        ]
    }

    /// Any JSON value without floats.
    pub fn arb_json_value() -> impl Strategy<Value = Value> {
        arb_leaf().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
            ]
        })
    }

    /// A JSON object, the shape of every cached record.
    pub fn arb_record() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z_]{1,8}", arb_json_value(), 0..6)
            .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stores and payloads.

    use super::*;
    use serde_json::{json, Value};

    /// A store backed by a [`FlakyBackend`] "remote", with a manual clock.
    #[derive(Debug, Clone)]
    pub struct TestStore {
        pub clock: ManualClock,
        pub remote: Arc<FlakyBackend>,
        pub store: Arc<KeyValueStore>,
    }

    impl TestStore {
        pub fn outage(&self) {
            self.remote.go_down();
        }

        pub fn recover(&self) {
            self.remote.come_up();
        }
    }

    pub fn layered_store() -> TestStore {
        let clock = ManualClock::default();
        let remote = Arc::new(FlakyBackend::new(&clock));
        let store = Arc::new(KeyValueStore::new(
            Some(remote.clone() as Arc<dyn StoreBackend>),
            clock.shared(),
        ));
        TestStore {
            clock,
            remote,
            store,
        }
    }

    /// A store with no remote at all.
    pub fn fallback_store() -> (Arc<KeyValueStore>, ManualClock) {
        let clock = ManualClock::default();
        (Arc::new(KeyValueStore::fallback_only(clock.shared())), clock)
    }

    /// The prediction payload used across cache scenarios.
    pub fn sample_prediction(customer_id: &str) -> Value {
        json!({
            "customer_id": customer_id,
            "prediction": 1,
            "churn_probability": 0.82,
        })
    }

    pub fn sample_prediction_input() -> Value {
        json!({"test": "data"})
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for store results.

    use super::*;

    /// Assert that a store call failed with a transient error.
    #[track_caller]
    pub fn assert_transient<T: std::fmt::Debug>(result: &StoreResult<T>) {
        match result {
            Err(e) if e.is_transient() => {}
            other => panic!("Expected transient store error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_flaky_backend_outage_and_recovery() {
        let clock = ManualClock::default();
        let backend = FlakyBackend::new(&clock);
        backend.set("k", "v", None).await.expect("set should succeed");

        backend.go_down();
        assertions::assert_transient(&backend.get("k").await);
        assertions::assert_transient(&backend.ping().await);
        assert_eq!(backend.failures(), 2);

        backend.come_up();
        assert_eq!(
            backend.get("k").await.expect("get should succeed"),
            Some("v".to_string())
        );
    }

    #[tokio::test]
    async fn test_layered_store_falls_back_during_outage() {
        let fixture = fixtures::layered_store();
        assert!(fixture.store.set("user:1", "a", None).await);

        fixture.outage();
        assert!(!fixture.store.is_available().await);
        assert!(!fixture.store.set("user:2", "b", None).await);
        assert_eq!(fixture.store.get_raw("user:2").await.as_deref(), Some("b"));

        fixture.recover();
        assert!(fixture.store.is_available().await);
        assert_eq!(fixture.store.get_raw("user:1").await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_info_while_up_reports_connected() {
        let fixture = fixtures::layered_store();
        let info = fixture.store.info().await;
        assert_eq!(info.status, StoreStatus::Connected);
        fixture.outage();
        assert_eq!(fixture.store.info().await.status, StoreStatus::Error);
    }

    proptest! {
        #[test]
        fn prop_identities_are_nonempty(id in generators::arb_identity()) {
            prop_assert!(!id.is_empty());
        }

        #[test]
        fn prop_policies_have_windows(policy in generators::arb_policy()) {
            prop_assert!(policy.window_secs() >= 1);
        }

        #[test]
        fn prop_records_are_objects(record in generators::arb_record()) {
            prop_assert!(record.is_object());
        }
    }
}
