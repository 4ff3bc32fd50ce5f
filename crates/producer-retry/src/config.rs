//! Declarative retry configuration
//!
//! [`RetryConfig`] can be deserialized from any serde format or loaded from
//! `PRODUCER_RETRY_*` environment variables, then turned into a
//! [`DefaultRetryPolicy`] with the caller's failure predicate.

use crate::error::{ConfigError, Result};
use crate::retry::{Backoff, DefaultRetryPolicy, ExponentialBackoff, FixedDelay, LinearBackoff};
use serde::{Deserialize, Serialize};
use std::env::{self, VarError};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable for [`RetryConfig::max_attempts`].
pub const ENV_MAX_ATTEMPTS: &str = "PRODUCER_RETRY_MAX_ATTEMPTS";
/// Environment variable for [`RetryConfig::delay_ms`].
pub const ENV_DELAY_MS: &str = "PRODUCER_RETRY_DELAY_MS";
/// Environment variable for [`RetryConfig::strategy`].
pub const ENV_STRATEGY: &str = "PRODUCER_RETRY_STRATEGY";
/// Environment variable for [`RetryConfig::multiplier`].
pub const ENV_MULTIPLIER: &str = "PRODUCER_RETRY_MULTIPLIER";
/// Environment variable for [`RetryConfig::max_delay_ms`].
pub const ENV_MAX_DELAY_MS: &str = "PRODUCER_RETRY_MAX_DELAY_MS";
/// Environment variable for [`RetryConfig::jitter`].
pub const ENV_JITTER: &str = "PRODUCER_RETRY_JITTER";

/// Shape of the delay between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `delay_ms` before every retry.
    #[default]
    Fixed,
    /// `delay_ms * failures`, capped at `max_delay_ms`.
    Linear,
    /// `delay_ms * multiplier^(failures - 1)` with jitter, capped at `max_delay_ms`.
    Exponential,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackoffStrategy::Fixed => "fixed",
            BackoffStrategy::Linear => "linear",
            BackoffStrategy::Exponential => "exponential",
        };
        f.write_str(name)
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            other => Err(format!(
                "unknown strategy '{}', expected fixed, linear or exponential",
                other
            )),
        }
    }
}

/// Configuration for a retry policy.
///
/// Defaults match the producer resilience scenarios: ten attempts, three
/// seconds apart.
///
/// # Examples
///
/// ```rust
/// use producer_retry::config::{BackoffStrategy, RetryConfig};
/// use producer_retry::retry::{AlwaysRetry, RetryPolicy};
///
/// let config: RetryConfig = serde_json::from_str(
///     r#"{ "max_attempts": 5, "delay_ms": 500, "strategy": "exponential" }"#,
/// ).unwrap();
/// assert_eq!(config.strategy, BackoffStrategy::Exponential);
///
/// let policy = config.into_policy(AlwaysRetry).unwrap();
/// assert_eq!(RetryPolicy::<std::io::Error>::max_attempts(&policy), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempt budget; 0 runs the operation once without retrying.
    pub max_attempts: u32,

    /// Base delay in milliseconds.
    pub delay_ms: u64,

    /// Delay strategy.
    pub strategy: BackoffStrategy,

    /// Growth factor for the exponential strategy.
    pub multiplier: f64,

    /// Upper bound in milliseconds for linear and exponential delays.
    pub max_delay_ms: u64,

    /// Jitter factor for the exponential strategy, in `[0.0, 1.0]`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay_ms: 3_000,
            strategy: BackoffStrategy::Fixed,
            multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: 0.0,
        }
    }
}

impl RetryConfig {
    /// Load configuration from environment variables.
    ///
    /// This will look for:
    /// - `PRODUCER_RETRY_MAX_ATTEMPTS`
    /// - `PRODUCER_RETRY_DELAY_MS`
    /// - `PRODUCER_RETRY_STRATEGY` (`fixed`, `linear`, `exponential`)
    /// - `PRODUCER_RETRY_MULTIPLIER`
    /// - `PRODUCER_RETRY_MAX_DELAY_MS`
    /// - `PRODUCER_RETRY_JITTER`
    ///
    /// Unset variables keep their defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Override fields from any `PRODUCER_RETRY_*` variables that are set.
    pub fn merge_env(mut self) -> Result<Self> {
        if let Some(max_attempts) = env_var(ENV_MAX_ATTEMPTS)? {
            self.max_attempts = max_attempts;
        }
        if let Some(delay_ms) = env_var(ENV_DELAY_MS)? {
            self.delay_ms = delay_ms;
        }
        if let Some(strategy) = env_var(ENV_STRATEGY)? {
            self.strategy = strategy;
        }
        if let Some(multiplier) = env_var(ENV_MULTIPLIER)? {
            self.multiplier = multiplier;
        }
        if let Some(max_delay_ms) = env_var(ENV_MAX_DELAY_MS)? {
            self.max_delay_ms = max_delay_ms;
        }
        if let Some(jitter) = env_var(ENV_JITTER)? {
            self.jitter = jitter;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check that every field is in range.
    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "jitter must be within [0.0, 1.0], got {}",
                self.jitter
            )));
        }
        if self.strategy != BackoffStrategy::Fixed && self.max_delay_ms < self.delay_ms {
            return Err(ConfigError::Invalid(format!(
                "max_delay_ms ({}) is below delay_ms ({})",
                self.max_delay_ms, self.delay_ms
            )));
        }
        Ok(())
    }

    /// Base delay as a `Duration`.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Delay cap as a `Duration`.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Build the configured backoff.
    pub fn backoff(&self) -> Box<dyn Backoff> {
        match self.strategy {
            BackoffStrategy::Fixed => Box::new(FixedDelay::new(self.delay())),
            BackoffStrategy::Linear => Box::new(LinearBackoff::new(self.delay(), self.max_delay())),
            BackoffStrategy::Exponential => Box::new(
                ExponentialBackoff::builder()
                    .initial_delay(self.delay())
                    .max_delay(self.max_delay())
                    .multiplier(self.multiplier)
                    .jitter(self.jitter)
                    .build(),
            ),
        }
    }

    /// Validate and build a policy that retries failures accepted by `predicate`.
    pub fn into_policy<P>(self, predicate: P) -> Result<DefaultRetryPolicy<P, Box<dyn Backoff>>> {
        self.validate()?;
        Ok(DefaultRetryPolicy::from_parts(
            self.max_attempts,
            predicate,
            self.backoff(),
        ))
    }
}

fn env_var<T>(var: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(var) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => Ok(Some(value)),
            Err(err) => Err(ConfigError::InvalidEnv {
                var,
                reason: err.to_string(),
                value: raw,
            }),
        },
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(ConfigError::InvalidEnv {
            var,
            value: raw.to_string_lossy().into_owned(),
            reason: "not valid unicode".to_string(),
        }),
    }
}
