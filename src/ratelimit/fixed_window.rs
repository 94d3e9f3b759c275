//! Fixed-window admission counter.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::clock::{Clock, SystemClock};
use super::policy::{self, AdmissionPolicy, PolicyKind, PolicySpec};
use crate::error::Result;

/// Admits at most `rate` units of work per fixed-length window.
///
/// The window re-arms lazily: expiry is only checked when an admission would
/// saturate the window (the counter sits at `rate - 1`). Calls that arrive
/// after the window has expired but before that point are still counted
/// against the old window.
pub struct FixedWindowCounter<C: Clock = SystemClock> {
    clock: C,
    /// `None` until the first successful `configure`
    state: Mutex<Option<WindowState>>,
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    /// Admissions allowed per window
    rate: u64,
    /// Window length
    window: Duration,
    /// When the current window started
    window_start: Instant,
    /// Admissions counted in the current window
    count: u64,
}

impl FixedWindowCounter {
    /// Create an unconfigured counter on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create a counter on the system clock admitting `rate` per `window`.
    pub fn configured(rate: u64, window: Duration) -> Result<Self> {
        let counter = Self::new();
        counter.configure(rate, window)?;
        Ok(counter)
    }
}

impl Default for FixedWindowCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> FixedWindowCounter<C> {
    /// Create an unconfigured counter reading time from `clock`.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: Mutex::new(None),
        }
    }

    /// Set the rate and window and start a fresh window now.
    pub fn configure(&self, rate: u64, window: Duration) -> Result<()> {
        policy::validate_window(rate, window)?;

        let mut state = self.state.lock();
        *state = Some(WindowState {
            rate,
            window,
            window_start: self.clock.now(),
            count: 0,
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

        if state.count == state.rate - 1 {
            let now = self.clock.now();
            if now.saturating_duration_since(state.window_start) >= state.window {
                state.window_start = now;
                state.count = 0;
                true
            } else {
                false
            }
        } else {
            state.count += 1;
            true
        }
    }

    /// Start a fresh window now, keeping the configured rate and window.
    pub fn reset(&self) {
        let mut guard = self.state.lock();
        if let Some(state) = guard.as_mut() {
            state.window_start = self.clock.now();
            state.count = 0;
        }
    }

    /// Admissions counted in the current window.
    pub fn count(&self) -> u64 {
        self.state.lock().map(|s| s.count).unwrap_or(0)
    }

    /// The configured rate, if any.
    pub fn rate(&self) -> Option<u64> {
        self.state.lock().map(|s| s.rate)
    }

    /// The configured window length, if any.
    pub fn window(&self) -> Option<Duration> {
        self.state.lock().map(|s| s.window)
    }

    /// Whether a configuration has been applied.
    pub fn is_configured(&self) -> bool {
        self.state.lock().is_some()
    }

    /// Whether the current window has elapsed.
    pub fn is_idle(&self) -> bool {
        match *self.state.lock() {
            Some(state) => {
                self.clock.now().saturating_duration_since(state.window_start) >= state.window
            }
            None => false,
        }
    }
}

impl<C: Clock> AdmissionPolicy for FixedWindowCounter<C> {
    fn allow(&self) -> bool {
        FixedWindowCounter::allow(self)
    }

    fn configure(&self, spec: &PolicySpec) -> Result<()> {
        match *spec {
            PolicySpec::FixedWindow { rate, window_ms } => {
                FixedWindowCounter::configure(self, rate, Duration::from_millis(window_ms))
            }
            _ => Err(policy::mismatch(PolicyKind::FixedWindow, spec)),
        }
    }

    fn reset(&self) {
        FixedWindowCounter::reset(self)
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::FixedWindow
    }

    fn is_configured(&self) -> bool {
        FixedWindowCounter::is_configured(self)
    }

    fn is_idle(&self) -> bool {
        FixedWindowCounter::is_idle(self)
    }
}
