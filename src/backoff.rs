//! Backoff schedule for the retrying prober.
//!
//! Geometric growth: the first retry waits `initial`, each later retry waits `multiplier`
//! times the previous one. Attempt semantics: attempt index `0` represents the initial call
//! (no delay), and retries start at `attempt = 1`.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use gateway_smoke::Backoff;
//!
//! let backoff = Backoff::geometric(Duration::from_millis(100), 2.0).unwrap();
//! assert_eq!(backoff.delay(0), Duration::from_millis(0)); // initial call
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(4), Duration::from_millis(800));
//! ```
//!
//! Overflow behavior: computations that would overflow saturate to `MAX_BACKOFF` (1 day).

use std::time::Duration;
use thiserror::Error;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackoffError {
    #[error("backoff multiplier must be finite and > 0 (got {0})")]
    InvalidMultiplier(f64),
}

/// Multiply a duration by a real factor, rounding to the nearest nanosecond and saturating at
/// `MAX_BACKOFF`.
pub(crate) fn scale(delay: Duration, factor: f64) -> Duration {
    let nanos = delay.as_nanos() as f64 * factor;
    if !nanos.is_finite() || nanos >= MAX_BACKOFF.as_nanos() as f64 {
        return MAX_BACKOFF;
    }
    if nanos <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(nanos.round() as u64)
}

/// Geometric backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    initial: Duration,
    multiplier: f64,
}

impl Backoff {
    /// Create a geometric schedule starting at `initial` and growing by `multiplier`.
    pub fn geometric(initial: Duration, multiplier: f64) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        Ok(Self { initial, multiplier })
    }

    /// Delay before the first retry.
    pub fn initial(&self) -> Duration {
        self.initial
    }

    /// Growth ratio between consecutive retries.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Calculate the delay for a given attempt number (0-based; 0 = initial call, no delay).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        scale(self.initial, self.multiplier.powi(exponent)).min(MAX_BACKOFF)
    }
}
