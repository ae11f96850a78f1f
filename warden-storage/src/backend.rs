//! Store backend trait.
//!
//! A backend is one concrete key-value service: the remote Redis store or
//! the in-process map. Backends report every failure as a [`StoreError`];
//! absorbing those failures is the job of
//! [`KeyValueStore`](crate::KeyValueStore), not of the backend.
//!
//! Values are plain strings at this layer. JSON encoding happens in the
//! facade so both backends hold byte-identical payloads.

use async_trait::async_trait;
use std::fmt::Debug;
use uuid::Uuid;
use warden_core::{BackendKind, KeyTtl, StoreInfo, StoreResult, Ttl};

/// One sliding-window admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    /// Current time in whole Unix seconds. Also the score of the new entry.
    pub now: i64,
    pub window_secs: u64,
    pub max_requests: u32,
    /// Expiry applied to the window key after an admission.
    pub expiry: Ttl,
    /// Unique identity of the entry, so two admissions in the same second
    /// are stored as two entries.
    pub member: String,
}

impl WindowRequest {
    pub fn new(now: i64, window_secs: u64, max_requests: u32, expiry: Ttl) -> Self {
        Self {
            now,
            window_secs,
            max_requests,
            expiry,
            member: format!("{now}-{}", Uuid::now_v7().simple()),
        }
    }

    /// Entries scored at or below this are outside the window.
    pub fn window_start(&self) -> i64 {
        window_start(self.now, self.window_secs)
    }
}

/// Lower bound (inclusive) of the expired region for a window ending at `now`.
pub fn window_start(now: i64, window_secs: u64) -> i64 {
    now.saturating_sub(i64::try_from(window_secs).unwrap_or(i64::MAX))
}

/// Result of pruning a window and optionally recording an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    pub admitted: bool,
    /// Live entries after the operation, including one just recorded.
    pub count: u64,
    /// Score of the oldest live entry.
    pub oldest: Option<i64>,
}

impl WindowOutcome {
    pub fn empty() -> Self {
        Self {
            admitted: false,
            count: 0,
            oldest: None,
        }
    }
}

/// A concrete key-value service.
///
/// Implementations must be safe to call from many tasks at once. The two
/// window operations must be atomic per key: concurrent callers may not
/// both observe a free slot when only one remains.
#[async_trait]
pub trait StoreBackend: Debug + Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Cheap liveness probe.
    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Replace the value and the expiry of `key`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Ttl>) -> StoreResult<()>;

    /// Number of keys removed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// Number of the given keys that exist. Repeated keys count repeatedly.
    async fn exists(&self, keys: &[String]) -> StoreResult<u64>;

    /// Add `by` to an integer value, creating it at zero. Keeps any expiry.
    async fn incr_by(&self, key: &str, by: i64) -> StoreResult<i64>;

    /// `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Ttl) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Keys matching a Redis glob pattern.
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Remove every key in the backend's database.
    async fn flush(&self) -> StoreResult<()>;

    async fn info(&self) -> StoreResult<StoreInfo>;

    /// Prune entries at or before the window start, count, and record the
    /// request when below the limit, refreshing the key's expiry.
    async fn window_admit(&self, key: &str, request: &WindowRequest)
        -> StoreResult<WindowOutcome>;

    /// Prune and count without recording.
    async fn window_peek(&self, key: &str, now: i64, window_secs: u64)
        -> StoreResult<WindowOutcome>;
}
