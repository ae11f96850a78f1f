//! Sliding-window rate limiter.
//!
//! Admission is checked against the shared store so every instance sees the
//! same window. When the store cannot be reached the limiter switches to its
//! in-process [`SlidingWindow`], which makes the same decisions for a single
//! process. Any other store failure is resolved by the configured
//! [`FailurePolicy`]; the default admits the request.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use warden_core::{
    FailurePolicy, RateLimitConfig, RateLimitPolicy, SharedClock, StoreError, Ttl, WardenResult,
};
use warden_storage::{KeyValueStore, WindowOutcome, WindowRequest};

use crate::key::{store_key, RateLimitKey};
use crate::window::SlidingWindow;

// ============================================================================
// DECISION
// ============================================================================

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// The shared store's window.
    Store,
    /// The in-process window, used while the store is unreachable.
    Local,
    /// The store failed mid-check; the failure policy decided.
    FailurePolicy,
    /// Enforcement is switched off.
    Bypass,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix second at which the oldest counted request leaves the window.
    pub reset_at: i64,
    /// Seconds to wait before retrying. Set only on rejection.
    pub retry_after: Option<u64>,
    pub source: DecisionSource,
}

impl RateLimitDecision {
    fn from_outcome(
        outcome: WindowOutcome,
        policy: &RateLimitPolicy,
        now: i64,
        source: DecisionSource,
    ) -> Self {
        let limit = policy.max_requests();
        let window = i64::try_from(policy.window_secs()).unwrap_or(i64::MAX);
        let reset_at = outcome.oldest.unwrap_or(now).saturating_add(window);
        let used = u32::try_from(outcome.count).unwrap_or(u32::MAX);

        Self {
            allowed: outcome.admitted,
            limit,
            remaining: limit.saturating_sub(used),
            reset_at,
            retry_after: (!outcome.admitted)
                .then(|| u64::try_from(reset_at.saturating_sub(now)).unwrap_or(0).max(1)),
            source,
        }
    }

    /// A decision that records nothing: bypass, or a failure policy verdict.
    fn unrecorded(
        allowed: bool,
        policy: &RateLimitPolicy,
        now: i64,
        source: DecisionSource,
    ) -> Self {
        let limit = policy.max_requests();
        let window = i64::try_from(policy.window_secs()).unwrap_or(i64::MAX);
        Self {
            allowed,
            limit,
            remaining: if allowed { limit } else { 0 },
            reset_at: now.saturating_add(window),
            retry_after: (!allowed).then(|| policy.window_secs().max(1)),
            source,
        }
    }
}

// ============================================================================
// RATE LIMITER
// ============================================================================

/// Admission control over the shared store.
#[derive(Debug)]
pub struct RateLimiter {
    store: Arc<KeyValueStore>,
    local: SlidingWindow,
    config: RateLimitConfig,
    bypass: AtomicBool,
    /// Set while decisions come from the in-process window.
    degraded: AtomicBool,
}

impl RateLimiter {
    pub fn new(store: Arc<KeyValueStore>, config: RateLimitConfig) -> Self {
        if config.bypass {
            warn!("Rate limiting disabled: bypass is on");
        } else if !store.has_remote() {
            warn!("Rate limiter using in-process window only");
        }

        Self {
            local: SlidingWindow::from_config(&config),
            bypass: AtomicBool::new(config.bypass),
            degraded: AtomicBool::new(false),
            store,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    /// The in-process window used while the store is unreachable.
    pub fn local(&self) -> &SlidingWindow {
        &self.local
    }

    /// Switch enforcement off or back on for the whole process.
    /// Windows already recorded are left as they are.
    pub fn set_bypass(&self, bypass: bool) {
        let was = self.bypass.swap(bypass, Ordering::SeqCst);
        if was != bypass {
            warn!(bypass, "Rate limit bypass toggled");
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::SeqCst)
    }

    /// Whether the last store call fell back to the in-process window.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn clock(&self) -> &SharedClock {
        self.store.clock()
    }

    /// Admit or reject one request from `identity`.
    ///
    /// Errors only when the policy itself is invalid (a zero window).
    /// Exhaustion is `Ok(false)`.
    pub async fn is_allowed(
        &self,
        identity: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> WardenResult<bool> {
        if self.is_bypassed() {
            return Ok(true);
        }
        let policy = RateLimitPolicy::new(max_requests, window_secs)?;
        Ok(self.check(identity, &policy).await.allowed)
    }

    /// Requests `identity` may still make in the current window.
    pub async fn get_remaining(
        &self,
        identity: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> WardenResult<u32> {
        if self.is_bypassed() {
            return Ok(max_requests);
        }
        let policy = RateLimitPolicy::new(max_requests, window_secs)?;
        let now = self.clock().unix_secs();
        let key = store_key(identity);

        let count = match self.store.window_peek(&key, now, window_secs).await {
            Ok(outcome) => {
                self.mark_recovered();
                outcome.count
            }
            Err(e) if routes_to_local(&e) => {
                self.mark_degraded(&e);
                self.local.peek(identity, now, window_secs).count
            }
            Err(e) => {
                warn!(identity = %identity, error = %e, "Rate limit remaining check failed");
                return Ok(match self.config.failure_policy {
                    FailurePolicy::Open => policy.max_requests(),
                    FailurePolicy::Closed => 0,
                });
            }
        };

        Ok(policy
            .max_requests()
            .saturating_sub(u32::try_from(count).unwrap_or(u32::MAX)))
    }

    /// Forget every admission recorded for `identity`, in the store and in
    /// the in-process window.
    ///
    /// A reset issued while the store is unreachable still holds after it
    /// recovers: the store replays the delete before serving the window.
    pub async fn reset(&self, identity: &str) {
        let removed = self.store.delete(&[store_key(identity)]).await;
        let local = self.local.reset(identity);
        info!(identity = %identity, removed, local, "Rate limit reset");
    }

    /// Full decision for one request under `policy`.
    pub async fn check(&self, identity: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        let now = self.clock().unix_secs();
        if self.is_bypassed() {
            return RateLimitDecision::unrecorded(true, policy, now, DecisionSource::Bypass);
        }

        let expiry = Ttl::at_least_one(
            policy
                .window_secs()
                .saturating_add(self.config.expiry_margin.as_secs()),
        );
        let request = WindowRequest::new(now, policy.window_secs(), policy.max_requests(), expiry);
        let key = store_key(identity);

        let decision = match self.store.window_admit(&key, &request).await {
            Ok(outcome) => {
                self.mark_recovered();
                RateLimitDecision::from_outcome(outcome, policy, now, DecisionSource::Store)
            }
            Err(e) if routes_to_local(&e) => {
                self.mark_degraded(&e);
                let outcome = self.local.admit(
                    identity,
                    now,
                    policy.window_secs(),
                    policy.max_requests(),
                );
                RateLimitDecision::from_outcome(outcome, policy, now, DecisionSource::Local)
            }
            Err(e) => {
                let allowed = self.config.failure_policy.admits();
                warn!(
                    identity = %identity,
                    error = %e,
                    allowed,
                    "Rate limit check failed, applying failure policy"
                );
                RateLimitDecision::unrecorded(allowed, policy, now, DecisionSource::FailurePolicy)
            }
        };

        if !decision.allowed {
            debug!(
                identity = %identity,
                limit = decision.limit,
                retry_after = ?decision.retry_after,
                "Rate limit exceeded"
            );
        }
        decision
    }

    /// [`check`](Self::check) for a typed key.
    pub async fn check_key(
        &self,
        key: &RateLimitKey,
        policy: &RateLimitPolicy,
    ) -> RateLimitDecision {
        self.check(&key.identity(), policy).await
    }

    /// [`check`](Self::check) under the named policy from the configured
    /// table, or the default policy for unknown names.
    pub async fn check_named(&self, identity: &str, name: &str) -> RateLimitDecision {
        let policy = self.config.policies.get(name);
        self.check(identity, &policy).await
    }

    fn mark_degraded(&self, error: &StoreError) {
        if !self.degraded.swap(true, Ordering::Relaxed) && self.store.has_remote() {
            warn!(error = %error, "Store unreachable, rate limiting from in-process window");
        }
    }

    fn mark_recovered(&self) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!("Store reachable again, rate limiting from store");
        }
    }
}

/// Store failures the in-process window can stand in for.
fn routes_to_local(error: &StoreError) -> bool {
    error.is_transient()
}

// ============================================================================
// TESTS
// ============================================================================
