//! Retrying prober
//!
//! Polls a side-effect-free probe until it yields a value, reports a fatal failure, or the
//! wait runs out of budget. Used wherever the system under test is only eventually consistent.
//!
//! Semantics:
//! - `ProbeError::Fatal(e)` returns `WaitError::Fatal(e)` immediately; budgets are not consulted.
//! - `ProbeError::Transient(e)` is retried until a budget is exhausted, then surfaces as
//!   `WaitError::Exhausted` carrying `e`, the attempt count and the elapsed time.
//! - `max_elapsed` is checked first. `max_attempts` only stops the loop when no `max_elapsed`
//!   is configured; once a time budget exists the attempt count is advisory.
//! - Sleeps follow the geometric backoff schedule, are jittered, then clamped to `floor_delay`.
//! - Sleeper and clock are injectable (production uses `TokioSleeper` and `MonotonicClock`;
//!   tests can use `TrackingSleeper` with a `ManualClock`).
//!
//! A policy with neither budget set polls forever on persistent transient failures; choosing
//! a budget is the caller's job.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use gateway_smoke::{InstantSleeper, ProbeError, RetryPolicy};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("not visible yet")]
//! struct NotYet;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::builder()
//!     .initial_delay(Duration::from_millis(100))
//!     .backoff_multiplier(2.0)
//!     .max_attempts(3)
//!     .with_sleeper(InstantSleeper)
//!     .build()
//!     .unwrap();
//! let result = policy
//!     .execute("projection", || async { Err::<(), _>(ProbeError::Transient(NotYet)) })
//!     .await;
//! assert!(result.unwrap_err().is_exhausted());
//! # });
//! ```

use crate::backoff::Backoff;
use crate::clock::{Clock, MonotonicClock};
use crate::error::{ProbeError, WaitError};
use crate::{Jitter, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
/// Default growth factor between retries.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.3;
/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: usize = 40;
/// Minimum sleep between attempts, whatever the schedule and jitter say.
pub const DEFAULT_FLOOR_DELAY: Duration = Duration::from_millis(50);

/// Immutable polling configuration plus the sleeper and clock it runs against.
#[derive(Clone)]
pub struct RetryPolicy {
    backoff: Backoff,
    max_attempts: Option<usize>,
    max_elapsed: Option<Duration>,
    floor_delay: Duration,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("backoff", &self.backoff)
            .field("max_attempts", &self.max_attempts)
            .field("max_elapsed", &self.max_elapsed)
            .field("floor_delay", &self.floor_delay)
            .field("jitter", &self.jitter)
            .field("sleeper", &"<sleeper>")
            .field("clock", &"<clock>")
            .finish()
    }
}

impl RetryPolicy {
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn initial_delay(&self) -> Duration {
        self.backoff.initial()
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff.multiplier()
    }

    /// Un-jittered delay schedule.
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn max_attempts(&self) -> Option<usize> {
        self.max_attempts
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed
    }

    pub fn floor_delay(&self) -> Duration {
        self.floor_delay
    }

    /// Copy of this policy with a different elapsed-time budget.
    pub fn with_max_elapsed(&self, max_elapsed: Option<Duration>) -> Self {
        Self { max_elapsed, ..self.clone() }
    }

    /// Poll `probe` until it yields a value, fails fatally, or the budgets run out.
    ///
    /// `what` names the awaited condition and ends up in logs and in `WaitError::Exhausted`.
    pub async fn execute<T, E, Fut, Op>(
        &self,
        what: impl Into<String>,
        mut probe: Op,
    ) -> Result<T, WaitError<E>>
    where
        E: std::error::Error + 'static,
        Fut: Future<Output = Result<T, ProbeError<E>>>,
        Op: FnMut() -> Fut,
    {
        let what = what.into();
        let start = self.clock.now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let last = match probe().await {
                Ok(value) => return Ok(value),
                Err(ProbeError::Fatal(e)) => return Err(WaitError::Fatal(e)),
                Err(ProbeError::Transient(e)) => e,
            };

            let elapsed = self.clock.now().saturating_sub(start);
            if self.is_exhausted(attempt, elapsed) {
                tracing::debug!(what = %what, attempts = attempt, ?elapsed, "wait exhausted");
                return Err(WaitError::Exhausted { what, attempts: attempt, elapsed, last });
            }

            let planned = self.backoff.delay(attempt);
            let sleep_for = self.jitter.apply(planned).max(self.floor_delay);
            tracing::warn!(
                what = %what,
                attempt,
                max_attempts = ?self.max_attempts,
                elapsed = format_args!("{:.1}s", elapsed.as_secs_f64()),
                error = %last,
                retry_in = format_args!("{:.2}s", sleep_for.as_secs_f64()),
                "probe failed; retrying"
            );
            self.sleeper.sleep(sleep_for).await;
        }
    }

    fn is_exhausted(&self, attempt: usize, elapsed: Duration) -> bool {
        match (self.max_elapsed, self.max_attempts) {
            (Some(budget), _) => elapsed >= budget,
            (None, Some(max)) => attempt >= max,
            (None, None) => false,
        }
    }
}

/// Builder for `RetryPolicy`.
pub struct RetryPolicyBuilder {
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_attempts: Option<usize>,
    max_elapsed: Option<Duration>,
    floor_delay: Duration,
    jitter: Jitter,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("initial_delay must be > 0")]
    ZeroInitialDelay,
    #[error("backoff_multiplier must be finite and > 0 (got {0})")]
    InvalidMultiplier(f64),
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
    #[error("floor_delay must be > 0")]
    ZeroFloorDelay,
    #[error("jitter spread must be in [0, 1) (got {0})")]
    InvalidJitter(f64),
}

impl RetryPolicyBuilder {
    /// Create a builder with the defaults: 500ms initial delay, x1.3 growth, 40 attempts,
    /// no elapsed-time budget, 50ms floor, ±10% jitter.
    pub fn new() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            max_elapsed: None,
            floor_delay: DEFAULT_FLOOR_DELAY,
            jitter: Jitter::default(),
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Remove the attempt budget.
    pub fn unbounded_attempts(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    pub fn max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed = Some(budget);
        self
    }

    pub fn floor_delay(mut self, floor: Duration) -> Self {
        self.floor_delay = floor;
        self
    }

    /// Set jitter strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Share an existing sleeper.
    pub fn with_shared_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Provide a custom clock implementation.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Share an existing clock.
    pub fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.initial_delay.is_zero() {
            return Err(BuildError::ZeroInitialDelay);
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 0.0 {
            return Err(BuildError::InvalidMultiplier(self.backoff_multiplier));
        }
        if self.max_attempts == Some(0) {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        if self.floor_delay.is_zero() {
            return Err(BuildError::ZeroFloorDelay);
        }
        if !self.jitter.is_valid() {
            return Err(BuildError::InvalidJitter(self.jitter.spread()));
        }
        let backoff = Backoff::geometric(self.initial_delay, self.backoff_multiplier)
            .map_err(|_| BuildError::InvalidMultiplier(self.backoff_multiplier))?;
        Ok(RetryPolicy {
            backoff,
            max_attempts: self.max_attempts,
            max_elapsed: self.max_elapsed,
            floor_delay: self.floor_delay,
            jitter: self.jitter,
            sleeper: self.sleeper,
            clock: self.clock,
        })
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
