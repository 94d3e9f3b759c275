//! The admission contract shared by every limiter.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};

/// The decision contract implemented by every limiter.
///
/// Implementations are leaves: they share no state with each other and can
/// be swapped freely by a caller.
pub trait AdmissionPolicy: Send + Sync {
    /// Decide whether one unit of work may proceed now.
    ///
    /// Never fails. An unconfigured limiter denies everything.
    fn allow(&self) -> bool;

    /// Re-arm the limiter from a policy specification.
    ///
    /// Fails with [`FloodgateError::InvalidConfiguration`] if the parameters
    /// are invalid or the specification names a different algorithm. A
    /// failed call leaves the previous configuration in place.
    fn configure(&self, spec: &PolicySpec) -> Result<()>;

    /// Re-arm the limiter from the current instant with its current
    /// parameters.
    fn reset(&self);

    /// Which algorithm this limiter implements.
    fn kind(&self) -> PolicyKind;

    /// Whether a successful configuration has been applied.
    fn is_configured(&self) -> bool;

    /// Whether the limiter has returned to a state no stricter than a
    /// freshly configured one, so that dropping it loses no admission
    /// history. Unconfigured limiters are never idle.
    fn is_idle(&self) -> bool;
}

/// The three admission algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    FixedWindow,
    LeakyBucket,
    TokenBucket,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::FixedWindow => "fixed_window",
            PolicyKind::LeakyBucket => "leaky_bucket",
            PolicyKind::TokenBucket => "token_bucket",
        };
        f.write_str(name)
    }
}

/// How full a token bucket is right after it is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialFill {
    /// Start with `capacity` tokens, permitting an immediate burst
    #[default]
    Full,
    /// Start with no tokens; admissions wait for the first refill
    Empty,
}

/// Parameters for one limiter, as written in a rules file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicySpec {
    /// At most `rate` admissions per `window_ms` milliseconds
    FixedWindow { rate: u64, window_ms: u64 },
    /// Drains `leak_rate` units per second, holds at most `capacity`
    LeakyBucket { leak_rate: f64, capacity: f64 },
    /// Accrues `fill_rate` tokens per second up to `capacity`
    TokenBucket {
        fill_rate: f64,
        capacity: f64,
        #[serde(default)]
        initial: InitialFill,
    },
}

impl PolicySpec {
    /// The algorithm this specification configures.
    pub fn kind(&self) -> PolicyKind {
        match self {
            PolicySpec::FixedWindow { .. } => PolicyKind::FixedWindow,
            PolicySpec::LeakyBucket { .. } => PolicyKind::LeakyBucket,
            PolicySpec::TokenBucket { .. } => PolicyKind::TokenBucket,
        }
    }

    /// Check the parameters without building a limiter.
    pub fn validate(&self) -> Result<()> {
        match *self {
            PolicySpec::FixedWindow { rate, window_ms } => {
                validate_window(rate, Duration::from_millis(window_ms))
            }
            PolicySpec::LeakyBucket {
                leak_rate,
                capacity,
            } => validate_leak(leak_rate, capacity),
            PolicySpec::TokenBucket {
                fill_rate,
                capacity,
                ..
            } => validate_fill(fill_rate, capacity),
        }
    }
}

pub(crate) fn validate_window(rate: u64, window: Duration) -> Result<()> {
    if rate == 0 {
        return Err(invalid("rate must be greater than 0"));
    }
    if window.is_zero() {
        return Err(invalid("window must be greater than 0"));
    }
    Ok(())
}

pub(crate) fn validate_leak(leak_rate: f64, capacity: f64) -> Result<()> {
    if !(leak_rate.is_finite() && leak_rate > 0.0) {
        return Err(invalid(format!(
            "leak_rate must be a positive number, got {}",
            leak_rate
        )));
    }
    validate_capacity(capacity)
}

pub(crate) fn validate_fill(fill_rate: f64, capacity: f64) -> Result<()> {
    // A zero fill rate is a fixed, non-replenishing allowance.
    if !(fill_rate.is_finite() && fill_rate >= 0.0) {
        return Err(invalid(format!(
            "fill_rate must be a non-negative number, got {}",
            fill_rate
        )));
    }
    validate_capacity(capacity)
}

// Every admission costs one whole unit, so a bucket smaller than one unit
// could never admit.
fn validate_capacity(capacity: f64) -> Result<()> {
    if !(capacity.is_finite() && capacity >= 1.0) {
        return Err(invalid(format!(
            "capacity must be a number of at least 1, got {}",
            capacity
        )));
    }
    Ok(())
}

pub(crate) fn mismatch(expected: PolicyKind, spec: &PolicySpec) -> FloodgateError {
    invalid(format!(
        "cannot configure a {} limiter with a {} policy",
        expected,
        spec.kind()
    ))
}

fn invalid(msg: impl Into<String>) -> FloodgateError {
    FloodgateError::InvalidConfiguration(msg.into())
}
