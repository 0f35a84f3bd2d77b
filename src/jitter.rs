//! Jitter strategies to keep concurrent pollers from retrying in lockstep
//!
//! When to use which strategy:
//! - `None`: deterministic retries for tests or tightly controlled workflows.
//! - `Proportional`: uniform in `[delay * (1 - spread), delay * (1 + spread)]`. The default
//!   spread of `0.1` perturbs every sleep by at most ±10% while keeping the backoff curve intact.
//!
//! Notes:
//! - RNG: uses `rand`'s thread-local RNG by default; deterministic RNGs can be injected via
//!   `apply_with_rng`.
//! - Jitter never produces a negative delay. Enforcing a minimum sleep is the retry loop's job.
//!
//! Example:
//! ```rust
//! use gateway_smoke::Jitter;
//! use std::time::Duration;
//!
//! let jitter = Jitter::proportional(0.1).unwrap();
//! let jittered = jitter.apply(Duration::from_millis(1000));
//! assert!(jittered >= Duration::from_millis(900));
//! assert!(jittered <= Duration::from_millis(1100));
//! ```

use crate::backoff::scale;
use rand::{rng, Rng};
use std::time::Duration;

/// Spread used by `Jitter::default()`.
pub const DEFAULT_SPREAD: f64 = 0.1;

/// Jitter strategy for randomizing retry delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Jitter {
    /// No jitter - use exact backoff delay
    None,
    /// Multiply the delay by a factor drawn uniformly from `[1 - spread, 1 + spread]`
    Proportional(f64),
}

impl Default for Jitter {
    fn default() -> Self {
        Jitter::Proportional(DEFAULT_SPREAD)
    }
}

impl Jitter {
    /// Create a proportional jitter strategy. `spread` must lie in `[0, 1)`.
    pub fn proportional(spread: f64) -> Result<Self, &'static str> {
        let jitter = Jitter::Proportional(spread);
        if !jitter.is_valid() {
            return Err("proportional jitter: spread must be in [0, 1)");
        }
        Ok(jitter)
    }

    /// Relative half-width of the jitter band (`0.0` for `None`).
    pub fn spread(&self) -> f64 {
        match self {
            Jitter::None => 0.0,
            Jitter::Proportional(spread) => *spread,
        }
    }

    /// Whether the spread lies in `[0, 1)`. The variant is public, so a hand-built value can
    /// be out of range; `RetryPolicyBuilder::build` rejects those.
    pub fn is_valid(&self) -> bool {
        (0.0..1.0).contains(&self.spread())
    }

    /// Apply jitter to a delay duration
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_internal(delay, &mut rng)
    }

    /// Apply jitter with a custom RNG (for testing)
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        self.apply_internal(delay, rng)
    }

    /// Inclusive bounds the jittered value of `delay` can take.
    pub fn bounds(&self, delay: Duration) -> (Duration, Duration) {
        match self {
            Jitter::Proportional(spread) if self.is_valid() => {
                (scale(delay, 1.0 - spread), scale(delay, 1.0 + spread))
            }
            _ => (delay, delay),
        }
    }

    fn apply_internal<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Proportional(spread) => {
                // an out-of-range spread would make the sampling range empty
                if delay.is_zero() || *spread == 0.0 || !self.is_valid() {
                    return delay;
                }
                let factor = rng.random_range((1.0 - spread)..=(1.0 + spread));
                scale(delay, factor)
            }
        }
    }
}
