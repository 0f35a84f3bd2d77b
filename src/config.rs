//! Run configuration.
//!
//! Built once at startup from the process environment (or any key lookup, for tests) and
//! passed down explicitly. Nothing else in the crate reads environment variables.

use crate::retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "http://localhost:90";
const DEFAULT_PASSWORD: &str = "yourpassword";
const DEFAULT_RETRIES: usize = 40;
const DEFAULT_RETRY_DELAY_SECS: f64 = 0.5;
const DEFAULT_BACKOFF: f64 = 1.3;
const DEFAULT_MAX_WAIT_STOCK_INIT_SECS: f64 = 90.0;
const DEFAULT_MAX_WAIT_STOCK_AFTER_SECS: f64 = 60.0;
const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 10.0;

/// Errors produced while reading configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },
    #[error("invalid retry settings: {0}")]
    Policy(#[from] BuildError),
}

/// Settings for one smoke-test run.
#[derive(Clone, PartialEq)]
pub struct SmokeConfig {
    /// Gateway root, without a trailing slash.
    pub base_url: String,
    /// Password for the throwaway test user.
    pub password: String,
    /// Attempt budget for every poll.
    pub retries: usize,
    /// Delay before the first retry of a poll.
    pub retry_delay: Duration,
    /// Growth factor between poll retries.
    pub backoff: f64,
    /// Time budget for the stock projection to appear and to reflect the replenish.
    pub max_wait_stock_init: Duration,
    /// Time budget for the stock to reflect an order.
    pub max_wait_stock_after: Duration,
    /// Per-request transport timeout.
    pub request_timeout: Duration,
}

impl fmt::Debug for SmokeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmokeConfig")
            .field("base_url", &self.base_url)
            .field("password", &"<redacted>")
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("backoff", &self.backoff)
            .field("max_wait_stock_init", &self.max_wait_stock_init)
            .field("max_wait_stock_after", &self.max_wait_stock_after)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
            backoff: DEFAULT_BACKOFF,
            max_wait_stock_init: Duration::from_secs_f64(DEFAULT_MAX_WAIT_STOCK_INIT_SECS),
            max_wait_stock_after: Duration::from_secs_f64(DEFAULT_MAX_WAIT_STOCK_AFTER_SECS),
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl SmokeConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; missing keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let base_url = lookup("BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        if base_url.is_empty() {
            return Err(invalid("BASE_URL", "", "must not be empty"));
        }

        let retries = match lookup("RETRIES") {
            Some(raw) => match parse::<usize>("RETRIES", &raw)? {
                0 => return Err(invalid("RETRIES", &raw, "must be > 0")),
                n => n,
            },
            None => defaults.retries,
        };

        let backoff = match lookup("BACKOFF") {
            Some(raw) => {
                let value = parse::<f64>("BACKOFF", &raw)?;
                if !value.is_finite() || value <= 0.0 {
                    return Err(invalid("BACKOFF", &raw, "must be a finite number > 0"));
                }
                value
            }
            None => defaults.backoff,
        };

        Ok(Self {
            base_url,
            password: lookup("PASSWORD").unwrap_or(defaults.password),
            retries,
            retry_delay: seconds(&lookup, "RETRY_DELAY", defaults.retry_delay)?,
            backoff,
            max_wait_stock_init: seconds(
                &lookup,
                "MAX_WAIT_STOCK_INIT",
                defaults.max_wait_stock_init,
            )?,
            max_wait_stock_after: seconds(
                &lookup,
                "MAX_WAIT_STOCK_AFTER",
                defaults.max_wait_stock_after,
            )?,
            request_timeout: seconds(&lookup, "REQUEST_TIMEOUT", defaults.request_timeout)?,
        })
    }

    /// Builder preloaded with the polling settings, bounded by `max_elapsed`.
    pub fn poll_policy_builder(&self, max_elapsed: Duration) -> RetryPolicyBuilder {
        RetryPolicy::builder()
            .initial_delay(self.retry_delay)
            .backoff_multiplier(self.backoff)
            .max_attempts(self.retries)
            .max_elapsed(max_elapsed)
    }

    /// Polling policy shared by every wait in the scenario, bounded by `max_elapsed`.
    pub fn poll_policy(&self, max_elapsed: Duration) -> Result<RetryPolicy, ConfigError> {
        Ok(self.poll_policy_builder(max_elapsed).build()?)
    }
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key, value: value.to_string(), reason: reason.into() }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| invalid(key, raw, e.to_string()))
}

fn seconds<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let secs = parse::<f64>(key, &raw)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(invalid(key, &raw, "must be a positive number of seconds"));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(key, &raw, e.to_string()))
}
