//! Backoff strategies: how long to wait between a failed attempt and the next.

use std::fmt;
use std::time::Duration;

/// Computes the wait inserted before the next attempt.
///
/// Implementations must be stateless so one instance can back any number of
/// concurrent sessions. The retry budget is not part of a backoff; it belongs
/// to the policy.
///
/// # Examples
///
/// ```rust
/// use producer_retry::retry::{Backoff, FixedDelay};
/// use std::time::Duration;
///
/// let backoff = FixedDelay::new(Duration::from_millis(500));
/// assert_eq!(backoff.next_delay(1), Duration::from_millis(500));
/// assert_eq!(backoff.next_delay(7), Duration::from_millis(500));
/// ```
pub trait Backoff: fmt::Debug + Send + Sync {
    /// Delay before the next attempt.
    ///
    /// `failures` is the number of failed attempts recorded so far in the
    /// session, so the first call after the initial attempt fails receives 1.
    fn next_delay(&self, failures: u32) -> Duration;
}

impl<B: Backoff + ?Sized> Backoff for Box<B> {
    fn next_delay(&self, failures: u32) -> Duration {
        (**self).next_delay(failures)
    }
}

impl<B: Backoff + ?Sized> Backoff for std::sync::Arc<B> {
    fn next_delay(&self, failures: u32) -> Duration {
        (**self).next_delay(failures)
    }
}

/// The same delay before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    /// Create a fixed backoff.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Retry immediately, without pausing.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    /// The configured delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Backoff for FixedDelay {
    fn next_delay(&self, _failures: u32) -> Duration {
        self.delay
    }
}

/// Delay grows by `initial` for every failure: `initial * failures`, capped
/// at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    initial: Duration,
    max_delay: Duration,
}

impl LinearBackoff {
    /// Create a linear backoff.
    pub fn new(initial: Duration, max_delay: Duration) -> Self {
        Self { initial, max_delay }
    }
}

impl Backoff for LinearBackoff {
    fn next_delay(&self, failures: u32) -> Duration {
        self.initial
            .saturating_mul(failures.max(1))
            .min(self.max_delay)
    }
}

/// Exponential backoff with configurable jitter.
///
/// Delays increase exponentially: `initial_delay * multiplier^(failures - 1)`,
/// capped at `max_delay`. Jitter randomizes each delay to avoid many producers
/// hammering a recovering broker in lockstep.
///
/// # Mathematical Formula
///
/// For the `n`-th failure (1-indexed):
/// ```text
/// base_delay = initial_delay * (multiplier ^ (n - 1))
/// jittered   = base_delay + base_delay * jitter * random(-1.0, +1.0)
/// final      = min(jittered, max_delay)
/// ```
///
/// # Examples
///
/// ```rust
/// use producer_retry::retry::{Backoff, ExponentialBackoff};
/// use std::time::Duration;
///
/// let backoff = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(30))
///     .multiplier(2.0)
///     .jitter(0.0)
///     .build();
///
/// assert_eq!(backoff.next_delay(1), Duration::from_millis(100));
/// assert_eq!(backoff.next_delay(3), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    /// Create a new builder for configuring exponential backoff.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Initial delay before the first retry.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound for any single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor applied per failure.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Jitter factor in `[0.0, 1.0]`.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }
}

impl Default for ExponentialBackoff {
    /// Defaults:
    /// - `initial_delay`: 100ms
    /// - `max_delay`: 60s
    /// - `multiplier`: 2.0 (doubles each time)
    /// - `jitter`: 0.1 (10% randomization)
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&self, failures: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);

        // Range is [base * (1 - jitter), base * (1 + jitter)]
        let jittered = if self.jitter > 0.0 {
            let jitter_amount = base_delay * self.jitter * (rand::random::<f64>() - 0.5) * 2.0;
            base_delay + jitter_amount
        } else {
            base_delay
        };

        let capped = jittered.min(self.max_delay.as_secs_f64());
        if capped.is_nan() || capped <= 0.0 {
            return Duration::ZERO;
        }
        // The f64 cap can round above `Duration::MAX`.
        Duration::try_from_secs_f64(capped)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Builder for configuring `ExponentialBackoff`.
///
/// Unset parameters fall back to the `Default` values.
#[derive(Debug, Default)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl ExponentialBackoffBuilder {
    /// Set the delay before the first retry.
    ///
    /// Default: 100ms
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the maximum delay between retries.
    ///
    /// Default: 60s
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the exponential multiplier.
    ///
    /// Default: 2.0
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Set the jitter factor, clamped to `[0.0, 1.0]`.
    ///
    /// A jitter of 0.1 lets the delay vary by ±10%.
    ///
    /// Default: 0.1
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter.clamp(0.0, 1.0));
        self
    }

    /// Build the `ExponentialBackoff` instance.
    pub fn build(self) -> ExponentialBackoff {
        let defaults = ExponentialBackoff::default();
        ExponentialBackoff {
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            jitter: self.jitter.unwrap_or(defaults.jitter),
        }
    }
}
