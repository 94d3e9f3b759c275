//! Per-resource, per-key limiter ownership.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::fixed_window::FixedWindowCounter;
use super::leaky_bucket::LeakyBucket;
use super::policy::{AdmissionPolicy, PolicyKind, PolicySpec};
use super::rules::AdmissionRules;
use super::token_bucket::TokenBucket;
use crate::error::{FloodgateError, Result};

/// Identifies one limiter instance: a resource and a caller key within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    pub resource: String,
    pub key: String,
}

impl LimiterKey {
    pub fn new(resource: &str, key: &str) -> Self {
        Self {
            resource: resource.to_string(),
            key: key.to_string(),
        }
    }
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.key)
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub policy: PolicyKind,
}

/// Limiter creations between two idle sweeps, unless overridden with
/// [`AdmissionRegistry::with_sweep_interval`].
pub const DEFAULT_SWEEP_INTERVAL: u64 = 1024;

/// Owns one limiter per `(resource, key)` pair.
///
/// Limiters are created lazily from the resource's rule the first time a key
/// is seen. Every `sweep_interval` creations the registry drops limiters that
/// have gone idle (see [`AdmissionPolicy::is_idle`]), so callers that rotate
/// keys cannot grow the map without bound. The registry is an ordinary value:
/// build it once and share it through an `Arc`.
pub struct AdmissionRegistry<C: Clock + Clone + 'static = SystemClock> {
    clock: C,
    /// Policy per resource name
    rules: HashMap<String, PolicySpec>,
    limiters: DashMap<LimiterKey, Arc<dyn AdmissionPolicy>>,
    /// Limiters created since the last sweep
    created: AtomicU64,
    sweep_interval: u64,
}

impl AdmissionRegistry {
    /// Create a registry on the system clock.
    pub fn new(rules: &AdmissionRules) -> Result<Self> {
        Self::with_clock(rules, SystemClock)
    }
}

impl<C: Clock + Clone + 'static> AdmissionRegistry<C> {
    /// Create a registry whose limiters read time from `clock`.
    pub fn with_clock(rules: &AdmissionRules, clock: C) -> Result<Self> {
        rules.validate()?;

        let rules = rules
            .resources
            .iter()
            .map(|r| (r.name.clone(), r.policy.clone()))
            .collect();

        Ok(Self {
            clock,
            rules,
            limiters: DashMap::new(),
            created: AtomicU64::new(0),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        })
    }

    /// Sweep idle limiters every `interval` creations instead of the default.
    /// An interval of 0 is treated as 1.
    pub fn with_sweep_interval(mut self, interval: u64) -> Self {
        self.sweep_interval = interval.max(1);
        self
    }

    /// Decide whether one unit of work for `resource`/`key` may proceed.
    pub fn check(&self, resource: &str, key: &str) -> Result<Decision> {
        let (allowed, policy) =
            self.with_limiter(resource, key, |limiter| (limiter.allow(), limiter.kind()))?;

        trace!(
            resource = %resource,
            key = %key,
            allowed = allowed,
            "Admission decision"
        );
        if !allowed {
            debug!(resource = %resource, key = %key, "Admission denied");
        }

        Ok(Decision { allowed, policy })
    }

    /// The limiter for `resource`/`key`, creating it if needed.
    ///
    /// The handle is detached from the registry if the limiter is later
    /// evicted as idle; [`check`](Self::check) never observes that.
    pub fn limiter(&self, resource: &str, key: &str) -> Result<Arc<dyn AdmissionPolicy>> {
        self.with_limiter(resource, key, |limiter| Arc::clone(limiter))
    }

    /// Run `f` on the limiter for `resource`/`key` while its map shard is
    /// locked, so an idle sweep cannot remove it mid-decision.
    fn with_limiter<R>(
        &self,
        resource: &str,
        key: &str,
        f: impl FnOnce(&Arc<dyn AdmissionPolicy>) -> R,
    ) -> Result<R> {
        let limiter_key = LimiterKey::new(resource, key);
        if let Some(existing) = self.limiters.get(&limiter_key) {
            return Ok(f(existing.value()));
        }

        let spec = self
            .rules
            .get(resource)
            .ok_or_else(|| FloodgateError::UnknownResource(resource.to_string()))?;
        let built = self.build_limiter(spec)?;

        // Sweep before inserting: a fresh limiter may already count as idle.
        self.note_creation();

        // A concurrent caller may have inserted first; keep whichever won.
        let entry = self.limiters.entry(limiter_key).or_insert_with(|| {
            debug!(
                resource = %resource,
                key = %key,
                policy = %spec.kind(),
                "Creating limiter"
            );
            built
        });
        Ok(f(entry.value()))
    }

    fn note_creation(&self) {
        if self.created.fetch_add(1, Ordering::Relaxed) + 1 >= self.sweep_interval {
            self.created.store(0, Ordering::Relaxed);
            self.evict_idle();
        }
    }

    /// Drop every limiter that has returned to its starting state, returning
    /// how many were removed.
    ///
    /// A dropped key is rebuilt from its rule on next use. Handles already
    /// returned by [`limiter`](Self::limiter) stay valid but are detached from
    /// the registry.
    pub fn evict_idle(&self) -> usize {
        let before = self.limiters.len();
        self.limiters.retain(|_, limiter| !limiter.is_idle());
        let evicted = before.saturating_sub(self.limiters.len());

        if evicted > 0 {
            debug!(evicted = evicted, remaining = self.limiters.len(), "Evicted idle limiters");
        }
        evicted
    }

    fn build_limiter(&self, spec: &PolicySpec) -> Result<Arc<dyn AdmissionPolicy>> {
        let limiter: Arc<dyn AdmissionPolicy> = match spec.kind() {
            PolicyKind::FixedWindow => Arc::new(FixedWindowCounter::with_clock(self.clock.clone())),
            PolicyKind::LeakyBucket => Arc::new(LeakyBucket::with_clock(self.clock.clone())),
            PolicyKind::TokenBucket => Arc::new(TokenBucket::with_clock(self.clock.clone())),
        };
        limiter.configure(spec)?;
        Ok(limiter)
    }

    /// Whether a rule exists for `resource`.
    pub fn has_resource(&self, resource: &str) -> bool {
        self.rules.contains_key(resource)
    }

    /// Configured resource names, sorted.
    pub fn resource_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Re-arm every existing limiter of `resource`.
    pub fn reset_resource(&self, resource: &str) {
        for entry in self.limiters.iter() {
            if entry.key().resource == resource {
                entry.value().reset();
            }
        }
    }

    /// Drop all limiters; the next check for each key starts fresh.
    pub fn clear(&self) {
        self.limiters.clear();
    }

    /// Number of live limiters.
    pub fn limiter_count(&self) -> usize {
        self.limiters.len()
    }
}
