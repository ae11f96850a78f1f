//! In-process sliding window.
//!
//! Used when the remote store cannot be reached. Each identity maps to the
//! second-resolution timestamps of its admissions. Pruning and admission
//! run under the map's per-key lock, so concurrent callers on one identity
//! never both take the last slot.
//!
//! Idle identities are dropped by a sweep that runs at most once per
//! cleanup interval, triggered by whichever call first notices the interval
//! has passed.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use warden_core::RateLimitConfig;
use warden_storage::{window_start, WindowOutcome};

#[derive(Debug)]
pub struct SlidingWindow {
    windows: DashMap<String, Vec<i64>>,
    cleanup_interval_secs: i64,
    retention_secs: u64,
    /// Longest window ever checked. The sweep never drops timestamps a
    /// live window still counts.
    longest_window_secs: AtomicU64,
    last_sweep: AtomicI64,
}

impl SlidingWindow {
    pub fn new(cleanup_interval: Duration, retention: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            cleanup_interval_secs: i64::try_from(cleanup_interval.as_secs()).unwrap_or(i64::MAX),
            retention_secs: retention.as_secs(),
            longest_window_secs: AtomicU64::new(0),
            last_sweep: AtomicI64::new(0),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.cleanup_interval, config.retention)
    }

    /// Prune, count, and record `now` if a slot is free.
    pub fn admit(
        &self,
        identity: &str,
        now: i64,
        window_secs: u64,
        max_requests: u32,
    ) -> WindowOutcome {
        self.maybe_sweep(now);
        self.longest_window_secs
            .fetch_max(window_secs, Ordering::Relaxed);

        let start = window_start(now, window_secs);
        let mut stamps = self.windows.entry(identity.to_string()).or_default();
        stamps.retain(|&ts| ts > start);

        let admitted = (stamps.len() as u64) < u64::from(max_requests);
        if admitted {
            stamps.push(now);
        }
        summarize(admitted, &stamps)
    }

    /// Prune and count without recording. Unknown identities stay unknown.
    pub fn peek(&self, identity: &str, now: i64, window_secs: u64) -> WindowOutcome {
        self.maybe_sweep(now);

        let start = window_start(now, window_secs);
        match self.windows.get_mut(identity) {
            Some(mut stamps) => {
                stamps.retain(|&ts| ts > start);
                summarize(false, &stamps)
            }
            None => WindowOutcome::empty(),
        }
    }

    /// Forget every admission recorded for `identity`.
    pub fn reset(&self, identity: &str) -> bool {
        self.windows.remove(identity).is_some()
    }

    /// Forget everything.
    pub fn clear(&self) {
        self.windows.clear();
    }

    /// Identities currently tracked.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drop timestamps older than the retention horizon and the identities
    /// left with none. Returns how many identities were dropped.
    pub fn sweep(&self, now: i64) -> usize {
        let horizon = self
            .retention_secs
            .max(self.longest_window_secs.load(Ordering::Relaxed));
        let cutoff = window_start(now, horizon);

        let before = self.windows.len();
        self.windows.retain(|_, stamps| {
            stamps.retain(|&ts| ts > cutoff);
            !stamps.is_empty()
        });
        self.last_sweep.store(now, Ordering::Relaxed);

        let removed = before.saturating_sub(self.windows.len());
        debug!(
            removed,
            remaining = self.windows.len(),
            "In-process rate limit sweep"
        );
        removed
    }

    fn maybe_sweep(&self, now: i64) {
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now.saturating_sub(last) < self.cleanup_interval_secs {
            return;
        }
        // Only the caller that wins the swap sweeps.
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep(now);
        }
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

fn summarize(admitted: bool, stamps: &[i64]) -> WindowOutcome {
    WindowOutcome {
        admitted,
        count: stamps.len() as u64,
        oldest: stamps.iter().min().copied(),
    }
}
