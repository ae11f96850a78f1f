//! Property-Based Tests for KeyValueStore
//!
//! Properties:
//! - A structured value written then read before expiry is deep-equal.
//! - After its TTL elapses the value is absent.
//! - Deleting keys from one namespace never touches another.
//! - A delete issued while the remote store is down is not undone when it
//!   comes back.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use warden_core::{ManualClock, Ttl};
use warden_storage::{KeyValueStore, MemoryBackend, StoreBackend};
use warden_test_utils::fixtures::layered_store;
use warden_test_utils::generators::{arb_json_value, arb_record};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime should build")
}

/// Cached records are objects or arrays at the top level.
fn arb_cached() -> impl Strategy<Value = Value> {
    prop_oneof![
        arb_record(),
        prop::collection::vec(arb_json_value(), 0..4).prop_map(Value::Array),
    ]
}

fn layered(clock: &ManualClock) -> KeyValueStore {
    let remote = Arc::new(MemoryBackend::new(clock.shared()));
    KeyValueStore::new(Some(remote), clock.shared())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_roundtrip_before_expiry(
        key in "[a-z]{1,8}:[a-z0-9]{1,8}",
        value in arb_cached(),
        ttl_secs in 1u64..10_000,
        elapsed in 0u64..10_000,
        remote in any::<bool>(),
    ) {
        let rt = runtime();
        let clock = ManualClock::default();
        let store = if remote {
            layered(&clock)
        } else {
            KeyValueStore::fallback_only(clock.shared())
        };
        let ttl = Ttl::secs(ttl_secs).expect("non-zero ttl");

        rt.block_on(async {
            store.set(&key, &value, Some(ttl)).await;
            clock.advance_secs(elapsed);
            let read = store.get(&key).await;
            if elapsed < ttl_secs {
                prop_assert_eq!(read, Some(value.clone()));
            } else {
                prop_assert_eq!(read, None);
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_typed_string_roundtrip(text in "[ -~]{0,24}") {
        let rt = runtime();
        let store = KeyValueStore::fallback_only(ManualClock::default().shared());
        rt.block_on(async {
            store.set("s", &text, None).await;
            prop_assert_eq!(store.get_as::<String>("s").await, Some(text.clone()));
            prop_assert_eq!(store.get_raw("s").await, Some(text.clone()));
            Ok(())
        })?;
    }

    #[test]
    fn prop_namespace_delete_is_scoped(
        ids in prop::collection::btree_set("[a-z0-9]{1,6}", 1..6),
    ) {
        let rt = runtime();
        let clock = ManualClock::default();
        let store = layered(&clock);
        rt.block_on(async {
            for id in &ids {
                store.set(&format!("user:{id}"), &json!({"id": id}), None).await;
                store.set(&format!("history:{id}:50"), &json!([id]), None).await;
            }
            let removed = store.delete_matching("user:*").await;
            prop_assert_eq!(removed, ids.len() as u64);
            prop_assert!(store.keys("user:*").await.is_empty());
            prop_assert_eq!(store.keys("history:*").await.len(), ids.len());
            Ok(())
        })?;
    }

    #[test]
    fn prop_outage_delete_survives_recovery(
        ids in prop::collection::btree_set("[a-z0-9]{1,6}", 1..6),
        by_pattern in any::<bool>(),
    ) {
        let rt = runtime();
        let fixture = layered_store();
        rt.block_on(async {
            for id in &ids {
                fixture.store.set(&format!("user:{id}"), &json!({"id": id}), None).await;
            }
            fixture.store.set("history:1:50", &json!([1]), None).await;

            fixture.outage();
            if by_pattern {
                fixture.store.delete_matching("user:*").await;
            } else {
                let keys: Vec<String> = ids.iter().map(|id| format!("user:{id}")).collect();
                fixture.store.delete(&keys).await;
            }
            fixture.recover();

            for id in &ids {
                prop_assert_eq!(fixture.store.get(&format!("user:{id}")).await, None);
            }
            prop_assert!(!fixture.store.has_pending_invalidations());
            prop_assert!(fixture.remote.inner().keys("user:*").await.expect("keys").is_empty());
            prop_assert_eq!(fixture.store.get("history:1:50").await, Some(json!([1])));
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_invalidated_key_stays_absent_while_remote_is_down() {
    let fixture = layered_store();
    fixture.store.set("user:1", &json!({"id": 1}), None).await;

    fixture.outage();
    assert_eq!(fixture.store.delete(&["user:1"]).await, 0);
    assert!(fixture.store.has_pending_invalidations());
    assert_eq!(fixture.store.get("user:1").await, None);

    // A write made after the invalidation is served from the fallback.
    assert!(!fixture.store.set("user:1", &json!({"id": 1, "v": 2}), None).await);
    assert_eq!(
        fixture.store.get("user:1").await,
        Some(json!({"id": 1, "v": 2}))
    );

    fixture.recover();
    assert_eq!(fixture.store.get("user:1").await, None);
    assert!(!fixture.store.has_pending_invalidations());
}

#[tokio::test]
async fn test_flush_during_outage_is_replayed() {
    let fixture = layered_store();
    fixture.store.set("a", "1", None).await;
    fixture.store.set("ratelimit:c1", "x", None).await;

    fixture.outage();
    assert!(!fixture.store.flush().await);
    assert!(fixture.store.keys("*").await.is_empty());

    fixture.recover();
    assert_eq!(fixture.store.get_raw("a").await, None);
    assert!(fixture.remote.inner().is_empty().await);
}
