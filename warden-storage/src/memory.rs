//! In-process backend.
//!
//! A `HashMap` behind a tokio `RwLock`, keyed like the remote store and
//! honoring expiry lazily: an expired slot is invisible to readers and is
//! dropped by the next writer that touches it (or by [`MemoryBackend::purge_expired`]).
//!
//! Semantics mirror Redis where callers can observe them: string commands on
//! a window key fail with `WrongType`, `INCRBY` keeps the expiry, `TTL`
//! rounds to the nearest second, and emptied windows disappear.
//!
//! The map lives in this process only. Two processes falling back at the
//! same time each keep their own view.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use warden_core::{
    system_clock, BackendKind, KeyTtl, SharedClock, StoreError, StoreInfo, StoreResult, Ttl,
};

use crate::backend::{window_start, StoreBackend, WindowOutcome, WindowRequest};
use crate::pattern::glob_match;

#[derive(Debug, Clone)]
struct WindowEntry {
    score: i64,
    member: String,
}

#[derive(Debug, Clone)]
enum Payload {
    Text(String),
    Window(Vec<WindowEntry>),
}

#[derive(Debug, Clone)]
struct Slot {
    payload: Payload,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn text(value: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            payload: Payload::Text(value),
            expires_at,
        }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local key-value backend.
#[derive(Debug)]
pub struct MemoryBackend {
    slots: RwLock<HashMap<String, Slot>>,
    clock: SharedClock,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(system_clock())
    }
}

impl MemoryBackend {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        slots.values().filter(|s| s.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every key.
    pub async fn clear(&self) {
        self.slots.write().await.clear();
    }

    /// Drop expired slots. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, slot| slot.is_live(now));
        before - slots.len()
    }

    fn deadline(&self, ttl: Ttl) -> DateTime<Utc> {
        let delta = chrono::Duration::from_std(ttl.as_duration()).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Remove `key` if it has expired, then return the live slot.
    fn live_mut<'a>(
        slots: &'a mut HashMap<String, Slot>,
        key: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a mut Slot> {
        if slots.get(key).is_some_and(|s| !s.is_live(now)) {
            slots.remove(key);
        }
        slots.get_mut(key)
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }
}

/// Prune entries at or before `start` and report the remaining window.
fn prune(entries: &mut Vec<WindowEntry>, start: i64) -> (u64, Option<i64>) {
    entries.retain(|e| e.score > start);
    let oldest = entries.iter().map(|e| e.score).min();
    (entries.len() as u64, oldest)
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        match slots.get(key).filter(|s| s.is_live(now)) {
            None => Ok(None),
            Some(Slot {
                payload: Payload::Text(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Ttl>) -> StoreResult<()> {
        let expires_at = ttl.map(|t| self.deadline(t));
        self.slots
            .write()
            .await
            .insert(key.to_string(), Slot::text(value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        let mut removed = 0;
        for key in keys {
            if let Some(slot) = slots.remove(key) {
                if slot.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        Ok(keys
            .iter()
            .filter(|k| slots.get(k.as_str()).is_some_and(|s| s.is_live(now)))
            .count() as u64)
    }

    async fn incr_by(&self, key: &str, by: i64) -> StoreResult<i64> {
        let now = self.clock.now();
        let mut slots = self.slots.write().await;
        let not_integer =
            || StoreError::command("INCRBY", "value is not an integer or out of range");

        match Self::live_mut(&mut slots, key, now) {
            None => {
                slots.insert(key.to_string(), Slot::text(by.to_string(), None));
                Ok(by)
            }
            Some(Slot {
                payload: Payload::Text(value),
                ..
            }) => {
                let current: i64 = value.trim().parse().map_err(|_| not_integer())?;
                let next = current.checked_add(by).ok_or_else(|| {
                    StoreError::command("INCRBY", "increment or decrement would overflow")
                })?;
                *value = next.to_string();
                Ok(next)
            }
            Some(_) => Err(Self::wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Ttl) -> StoreResult<bool> {
        let now = self.clock.now();
        let deadline = self.deadline(ttl);
        let mut slots = self.slots.write().await;
        match Self::live_mut(&mut slots, key, now) {
            Some(slot) => {
                slot.expires_at = Some(deadline);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        let Some(slot) = slots.get(key).filter(|s| s.is_live(now)) else {
            return Ok(KeyTtl::Missing);
        };
        match slot.expires_at {
            None => Ok(KeyTtl::Persistent),
            Some(at) => {
                let ms = (at - now).num_milliseconds().max(0) as u64;
                Ok(KeyTtl::Expires(Duration::from_secs((ms + 500) / 1000)))
            }
        }
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = self.clock.now();
        let slots = self.slots.read().await;
        let mut keys: Vec<String> = slots
            .iter()
            .filter(|(k, s)| s.is_live(now) && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn flush(&self) -> StoreResult<()> {
        self.clear().await;
        Ok(())
    }

    async fn info(&self) -> StoreResult<StoreInfo> {
        Ok(StoreInfo::fallback(self.len().await as u64))
    }

    async fn window_admit(
        &self,
        key: &str,
        request: &WindowRequest,
    ) -> StoreResult<WindowOutcome> {
        let now = self.clock.now();
        let deadline = self.deadline(request.expiry);
        let mut slots = self.slots.write().await;

        let mut entries = match Self::live_mut(&mut slots, key, now) {
            None => Vec::new(),
            Some(Slot {
                payload: Payload::Window(entries),
                ..
            }) => std::mem::take(entries),
            Some(_) => return Err(Self::wrong_type(key)),
        };

        let (count, oldest) = prune(&mut entries, request.window_start());
        if count >= u64::from(request.max_requests) {
            if entries.is_empty() {
                slots.remove(key);
            } else if let Some(slot) = slots.get_mut(key) {
                slot.payload = Payload::Window(entries);
            }
            return Ok(WindowOutcome {
                admitted: false,
                count,
                oldest,
            });
        }

        // Same member re-scores, as ZADD does.
        match entries.iter_mut().find(|e| e.member == request.member) {
            Some(entry) => entry.score = request.now,
            None => entries.push(WindowEntry {
                score: request.now,
                member: request.member.clone(),
            }),
        }
        let count = entries.len() as u64;
        let oldest = entries.iter().map(|e| e.score).min();
        slots.insert(
            key.to_string(),
            Slot {
                payload: Payload::Window(entries),
                expires_at: Some(deadline),
            },
        );

        Ok(WindowOutcome {
            admitted: true,
            count,
            oldest,
        })
    }

    async fn window_peek(
        &self,
        key: &str,
        now: i64,
        window_secs: u64,
    ) -> StoreResult<WindowOutcome> {
        let at = self.clock.now();
        let mut slots = self.slots.write().await;
        let (count, oldest, emptied) = match Self::live_mut(&mut slots, key, at) {
            None => return Ok(WindowOutcome::empty()),
            Some(Slot {
                payload: Payload::Window(entries),
                ..
            }) => {
                let (count, oldest) = prune(entries, window_start(now, window_secs));
                (count, oldest, entries.is_empty())
            }
            Some(_) => return Err(Self::wrong_type(key)),
        };
        if emptied {
            slots.remove(key);
        }
        Ok(WindowOutcome {
            admitted: false,
            count,
            oldest,
        })
    }
}
