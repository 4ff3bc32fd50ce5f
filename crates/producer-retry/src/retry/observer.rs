//! Retry lifecycle callbacks.
//!
//! The executor reports every step of a session to a [`RetryObserver`]. The
//! default [`TracingObserver`] turns them into `tracing` events; tests use
//! [`StatsObserver`] to count them.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Receives callbacks while a retry session runs.
///
/// Attempt numbers are 1-indexed. Callbacks run inline on the session's task
/// and should return quickly.
pub trait RetryObserver: Send + Sync {
    /// An attempt is about to call `perform`.
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        let _ = (attempt, max_attempts);
    }

    /// An attempt failed and the session will retry after `delay`.
    fn on_attempt_failed(&self, attempt: u32, error: &dyn Display, delay: Duration);

    /// The operation succeeded on `attempt`.
    fn on_success(&self, attempt: u32, elapsed: Duration);

    /// The attempt budget ran out; `error` is the last failure.
    fn on_exhausted(&self, attempts: u32, error: &dyn Display);

    /// The session stopped on a failure the policy will not retry.
    fn on_non_retryable(&self, attempt: u32, error: &dyn Display);

    /// The session was cancelled while waiting to retry.
    fn on_cancelled(&self, attempts: u32) {
        let _ = attempts;
    }
}

impl<O: RetryObserver + ?Sized> RetryObserver for Arc<O> {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(attempt, max_attempts)
    }

    fn on_attempt_failed(&self, attempt: u32, error: &dyn Display, delay: Duration) {
        (**self).on_attempt_failed(attempt, error, delay)
    }

    fn on_success(&self, attempt: u32, elapsed: Duration) {
        (**self).on_success(attempt, elapsed)
    }

    fn on_exhausted(&self, attempts: u32, error: &dyn Display) {
        (**self).on_exhausted(attempts, error)
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Display) {
        (**self).on_non_retryable(attempt, error)
    }

    fn on_cancelled(&self, attempts: u32) {
        (**self).on_cancelled(attempts)
    }
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_failed(&self, _attempt: u32, _error: &dyn Display, _delay: Duration) {}

    fn on_success(&self, _attempt: u32, _elapsed: Duration) {}

    fn on_exhausted(&self, _attempts: u32, _error: &dyn Display) {}

    fn on_non_retryable(&self, _attempt: u32, _error: &dyn Display) {}
}

/// Logs retry events through `tracing`.
///
/// # Log Levels
///
/// - attempt start: DEBUG
/// - retryable failure: WARN
/// - success: INFO after retries, DEBUG on the first attempt
/// - exhaustion and non-retryable failure: ERROR
/// - cancellation: WARN
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    /// Create an observer that tags every event with `operation`.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// The operation name used in log fields.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            operation = %self.operation,
            attempt,
            max_attempts,
            "starting attempt"
        );
    }

    fn on_attempt_failed(&self, attempt: u32, error: &dyn Display, delay: Duration) {
        tracing::warn!(
            operation = %self.operation,
            attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, attempt: u32, elapsed: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                elapsed_ms = elapsed.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, attempts: u32, error: &dyn Display) {
        tracing::error!(
            operation = %self.operation,
            attempts,
            error = %error,
            "retry budget exhausted"
        );
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Display) {
        tracing::error!(
            operation = %self.operation,
            attempt,
            error = %error,
            "non-retryable failure"
        );
    }

    fn on_cancelled(&self, attempts: u32) {
        tracing::warn!(
            operation = %self.operation,
            attempts,
            "retry cancelled while waiting"
        );
    }
}

/// Counts events; handy for assertions and coarse metrics.
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    failures: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    non_retryable: AtomicU32,
    cancellations: AtomicU32,
}

impl StatsObserver {
    /// A zeroed observer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts started.
    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::Relaxed)
    }

    /// Number of failures that led to a retry.
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Number of successful sessions.
    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Number of sessions that ran out of budget.
    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::Relaxed)
    }

    /// Number of sessions stopped by a non-retryable failure.
    pub fn non_retryable(&self) -> u32 {
        self.non_retryable.load(Ordering::Relaxed)
    }

    /// Number of cancelled sessions.
    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::Relaxed)
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {
        self.attempt_starts.fetch_add(1, Ordering::Relaxed);
    }

    fn on_attempt_failed(&self, _attempt: u32, _error: &dyn Display, _delay: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    fn on_success(&self, _attempt: u32, _elapsed: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    fn on_exhausted(&self, _attempts: u32, _error: &dyn Display) {
        self.exhaustions.fetch_add(1, Ordering::Relaxed);
    }

    fn on_non_retryable(&self, _attempt: u32, _error: &dyn Display) {
        self.non_retryable.fetch_add(1, Ordering::Relaxed);
    }

    fn on_cancelled(&self, _attempts: u32) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }
}
