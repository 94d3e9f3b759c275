//! Token bucket limiter.

use std::time::Instant;

use parking_lot::Mutex;

use super::clock::{Clock, SystemClock};
use super::policy::{self, AdmissionPolicy, InitialFill, PolicyKind, PolicySpec};
use crate::error::Result;

/// A bucket that accrues tokens at a constant rate up to a capacity.
///
/// Each admission spends one whole token. Unlike [`LeakyBucket`], idle time
/// banks tokens, so a bucket left alone can grant a burst of up to
/// `capacity` admissions at once.
///
/// A fill rate of zero is allowed and turns the bucket into a fixed
/// allowance of `capacity` admissions (or none, if it starts empty).
///
/// [`LeakyBucket`]: super::LeakyBucket
pub struct TokenBucket<C: Clock = SystemClock> {
    clock: C,
    state: Mutex<Option<TokenState>>,
}

#[derive(Debug, Clone, Copy)]
struct TokenState {
    /// Tokens added per second
    fill_rate: f64,
    capacity: f64,
    initial: InitialFill,
    tokens: f64,
    last_check: Instant,
}

impl TokenState {
    fn starting_tokens(initial: InitialFill, capacity: f64) -> f64 {
        match initial {
            InitialFill::Full => capacity,
            InitialFill::Empty => 0.0,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_check).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.fill_rate).min(self.capacity);
        self.last_check = now;
    }
}

impl TokenBucket {
    /// Create an unconfigured bucket on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a full bucket on the system clock.
    pub fn configured(fill_rate: f64, capacity: f64) -> Result<Self> {
        let bucket = Self::new();
        bucket.configure(fill_rate, capacity)?;
        Ok(bucket)
    }
}

impl Default for TokenBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TokenBucket<C> {
    /// Create an unconfigured bucket reading time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: Mutex::new(None),
        }
    }

    /// Set the fill rate (tokens per second) and capacity, starting full.
    pub fn configure(&self, fill_rate: f64, capacity: f64) -> Result<()> {
        self.configure_with(fill_rate, capacity, InitialFill::Full)
    }

    /// Set the fill rate and capacity with an explicit starting level.
    ///
    /// The fill rate may be zero; the capacity must be at least 1, since each
    /// admission spends one whole token.
    pub fn configure_with(&self, fill_rate: f64, capacity: f64, initial: InitialFill) -> Result<()> {
        policy::validate_fill(fill_rate, capacity)?;

        let mut state = self.state.lock();
        *state = Some(TokenState {
            fill_rate,
            capacity,
            initial,
            tokens: TokenState::starting_tokens(initial, capacity),
            last_check: self.clock.now(),
        });
        Ok(())
    }

    /// Decide whether one unit of work may proceed, spending a token if so.
    pub fn allow(&self) -> bool {
        let mut guard = self.state.lock();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => return false,
        };

        state.refill(self.clock.now());

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Restore the configured starting level, keeping rate and capacity.
    pub fn reset(&self) {
        let mut guard = self.state.lock();
        if let Some(state) = guard.as_mut() {
            state.tokens = TokenState::starting_tokens(state.initial, state.capacity);
            state.last_check = self.clock.now();
        }
    }

    /// The stored token balance as of the last check.
    pub fn tokens(&self) -> f64 {
        self.state.lock().map(|s| s.tokens).unwrap_or(0.0)
    }

    /// The configured capacity, if any.
    pub fn capacity(&self) -> Option<f64> {
        self.state.lock().map(|s| s.capacity)
    }

    /// The configured fill rate, if any.
    pub fn fill_rate(&self) -> Option<f64> {
        self.state.lock().map(|s| s.fill_rate)
    }

    /// Whether a configuration has been applied.
    pub fn is_configured(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Whether the bucket has refilled to capacity by now.
    ///
    /// A bucket with a zero fill rate that has spent tokens never becomes
    /// idle.
    pub fn is_idle(&self) -> bool {
        match *self.state.lock() {
            Some(mut state) => {
                state.refill(self.clock.now());
                state.tokens >= state.capacity
            }
            None => false,
        }
    }
}

impl<C: Clock> AdmissionPolicy for TokenBucket<C> {
    fn allow(&self) -> bool {
        TokenBucket::allow(self)
    }

    fn configure(&self, spec: &PolicySpec) -> Result<()> {
        match *spec {
            PolicySpec::TokenBucket {
                fill_rate,
                capacity,
                initial,
            } => self.configure_with(fill_rate, capacity, initial),
            _ => Err(policy::mismatch(PolicyKind::TokenBucket, spec)),
        }
    }

    fn reset(&self) {
        TokenBucket::reset(self)
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::TokenBucket
    }

    fn is_configured(&self) -> bool {
        TokenBucket::is_configured(self)
    }

    fn is_idle(&self) -> bool {
        TokenBucket::is_idle(self)
    }
}
