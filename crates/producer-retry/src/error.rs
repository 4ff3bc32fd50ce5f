//! Error types for the retry engine
//!
//! [`RetryError`] is the terminal failure of a retry session. It is generic
//! over the operation's own failure type and keeps the three stop reasons
//! apart: budget exhaustion, a non-retryable failure, and cancellation.
//! [`ConfigError`] covers configuration loading.

use std::error::Error;
use std::fmt;

/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// How a retry session ended without success.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable failure.
    Exhausted {
        /// Attempts made, equal to the policy's budget.
        attempts: u32,
        /// The failure of the final attempt.
        source: E,
    },

    /// A failure the policy does not retry, or a failing `before_retry`.
    ///
    /// Never produced by budget exhaustion.
    NonRetryable {
        /// Attempts made, including the one that failed.
        attempts: u32,
        /// The terminal failure.
        source: E,
    },

    /// The session was cancelled while waiting to retry.
    Cancelled {
        /// Attempts completed before cancellation.
        attempts: u32,
        /// The failure that was about to be retried, if still available.
        last_error: Option<E>,
    },
}

impl<E> RetryError<E> {
    /// Create an exhausted error.
    pub fn exhausted(attempts: u32, source: E) -> Self {
        RetryError::Exhausted { attempts, source }
    }

    /// Create a non-retryable error.
    pub fn non_retryable(attempts: u32, source: E) -> Self {
        RetryError::NonRetryable { attempts, source }
    }

    /// Create a cancelled error.
    pub fn cancelled(attempts: u32, last_error: Option<E>) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    /// Attempts made before the session ended.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. }
            | RetryError::NonRetryable { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Check if the attempt budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Check if a non-retryable failure stopped the session.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// Check if the session was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Borrow the operation's failure.
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Take the operation's failure, consuming this error.
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Map the failure type using a closure.
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted { attempts, source } => RetryError::Exhausted {
                attempts,
                source: f(source),
            },
            RetryError::NonRetryable { attempts, source } => RetryError::NonRetryable {
                attempts,
                source: f(source),
            },
            RetryError::Cancelled {
                attempts,
                last_error,
            } => RetryError::Cancelled {
                attempts,
                last_error: last_error.map(f),
            },
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, source } => {
                write!(
                    f,
                    "operation did not complete successfully after {} attempts; last error: {}",
                    attempts, source
                )
            }
            RetryError::NonRetryable { attempts, source } => {
                write!(
                    f,
                    "non-retryable error on attempt {}: {}",
                    attempts, source
                )
            }
            RetryError::Cancelled {
                attempts,
                last_error: Some(err),
            } => write!(f, "retry cancelled after {} attempts: {}", attempts, err),
            RetryError::Cancelled {
                attempts,
                last_error: None,
            } => write!(f, "retry cancelled after {} attempts", attempts),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source_ref().map(|err| err as &(dyn Error + 'static))
    }
}

/// Errors raised while loading a retry configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Raw value found
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// A configuration field was out of range.
    #[error("Invalid retry configuration: {0}")]
    Invalid(String),
}
