//! Leaky bucket limiter.

use std::time::Instant;

use parking_lot::Mutex;

use super::clock::{Clock, SystemClock};
use super::policy::{self, AdmissionPolicy, PolicyKind, PolicySpec};
use crate::error::Result;

/// A bucket that drains at a constant rate.
///
/// Every admission pours one unit into the bucket. Before each decision the
/// level is lowered by `elapsed * leak_rate`; the unit is admitted only if it
/// fits under `capacity`. Bursts are smoothed toward the leak rate with at
/// most `capacity` units of slack.
pub struct LeakyBucket<C: Clock = SystemClock> {
    clock: C,
    state: Mutex<Option<LeakyState>>,
}

#[derive(Debug, Clone, Copy)]
struct LeakyState {
    /// Units drained per second
    leak_rate: f64,
    capacity: f64,
    level: f64,
    last_check: Instant,
}

impl LeakyState {
    fn drain(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_check).as_secs_f64();
        self.level = (self.level - elapsed * self.leak_rate).max(0.0);
        self.last_check = now;
    }
}

impl LeakyBucket {
    /// Create an unconfigured bucket on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty bucket on the system clock.
    pub fn configured(leak_rate: f64, capacity: f64) -> Result<Self> {
        let bucket = Self::new();
        bucket.configure(leak_rate, capacity)?;
        Ok(bucket)
    }
}

impl Default for LeakyBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> LeakyBucket<C> {
    /// Create an unconfigured bucket reading time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: Mutex::new(None),
        }
    }

    /// Set the leak rate (units per second) and capacity, and empty the bucket.
    ///
    /// The leak rate must be positive and the capacity at least 1, since each
    /// admission adds one whole unit.
    pub fn configure(&self, leak_rate: f64, capacity: f64) -> Result<()> {
        policy::validate_leak(leak_rate, capacity)?;

        let mut state = self.state.lock();
        *state = Some(LeakyState {
            leak_rate,
            capacity,
            level: 0.0,
            last_check: self.clock.now(),
        });
        Ok(())
    }

    /// Decide whether one unit of work may proceed.
    pub fn allow(&self) -> bool {
        let mut guard = self.state.lock();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => return false,
        };

        state.drain(self.clock.now());

        if state.level + 1.0 <= state.capacity {
            state.level += 1.0;
            true
        } else {
            false
        }
    }

    /// Empty the bucket, keeping the configured rate and capacity.
    pub fn reset(&self) {
        let mut guard = self.state.lock();
        if let Some(state) = guard.as_mut() {
            state.level = 0.0;
            state.last_check = self.clock.now();
        }
    }

    /// The stored water level as of the last check.
    pub fn level(&self) -> f64 {
        self.state.lock().map(|s| s.level).unwrap_or(0.0)
    }

    /// The configured capacity, if any.
    pub fn capacity(&self) -> Option<f64> {
        self.state.lock().map(|s| s.capacity)
    }

    /// The configured leak rate, if any.
    pub fn leak_rate(&self) -> Option<f64> {
        self.state.lock().map(|s| s.leak_rate)
    }

    /// Whether a configuration has been applied.
    pub fn is_configured(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Whether the bucket has drained to empty by now.
    pub fn is_idle(&self) -> bool {
        match *self.state.lock() {
            Some(mut state) => {
                state.drain(self.clock.now());
                state.level <= 0.0
            }
            None => false,
        }
    }
}

impl<C: Clock> AdmissionPolicy for LeakyBucket<C> {
    fn allow(&self) -> bool {
        LeakyBucket::allow(self)
    }

    fn configure(&self, spec: &PolicySpec) -> Result<()> {
        match *spec {
            PolicySpec::LeakyBucket {
                leak_rate,
                capacity,
            } => LeakyBucket::configure(self, leak_rate, capacity),
            _ => Err(policy::mismatch(PolicyKind::LeakyBucket, spec)),
        }
    }

    fn reset(&self) {
        LeakyBucket::reset(self)
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::LeakyBucket
    }

    fn is_configured(&self) -> bool {
        LeakyBucket::is_configured(self)
    }

    fn is_idle(&self) -> bool {
        LeakyBucket::is_idle(self)
    }
}
