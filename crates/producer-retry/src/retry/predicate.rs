//! Failure classification.
//!
//! A predicate answers a single question about a failure: may the operation
//! be attempted again? Anything it rejects is fatal on first occurrence.

use std::fmt;

/// Decides whether a failure kind is eligible for another attempt.
///
/// # Example
///
/// ```rust
/// use producer_retry::retry::RetryPredicate;
/// use std::io::{Error, ErrorKind};
///
/// struct TransientIo;
///
/// impl RetryPredicate<Error> for TransientIo {
///     fn is_retryable(&self, error: &Error) -> bool {
///         matches!(
///             error.kind(),
///             ErrorKind::ConnectionRefused | ErrorKind::TimedOut | ErrorKind::ConnectionReset
///         )
///     }
/// }
/// ```
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Whether `failure` may be retried.
    fn is_retryable(&self, failure: &E) -> bool;
}

/// Every failure is retryable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn is_retryable(&self, _failure: &E) -> bool {
        true
    }
}

/// No failure is retryable; the operation runs exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl<E: ?Sized> RetryPredicate<E> for NeverRetry {
    fn is_retryable(&self, _failure: &E) -> bool {
        false
    }
}

/// A predicate backed by a closure.
#[derive(Clone)]
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Wrap a closure.
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> fmt::Debug for ClosurePredicate<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosurePredicate").finish_non_exhaustive()
    }
}

impl<E: ?Sized, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_retryable(&self, failure: &E) -> bool {
        (self.predicate)(failure)
    }
}

/// Failures that carry their own classification.
///
/// Error enums implement this once and pair it with [`Classified`], which is
/// the usual way to say "only retry failures of kind X".
pub trait Transient {
    /// Whether this failure is expected to clear up on its own.
    fn is_transient(&self) -> bool;
}

/// Retries exactly the failures whose [`Transient::is_transient`] is true.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classified;

impl<E: Transient + ?Sized> RetryPredicate<E> for Classified {
    fn is_retryable(&self, failure: &E) -> bool {
        failure.is_transient()
    }
}

impl<E: ?Sized, P: RetryPredicate<E> + ?Sized> RetryPredicate<E> for Box<P> {
    fn is_retryable(&self, failure: &E) -> bool {
        (**self).is_retryable(failure)
    }
}

impl<E: ?Sized, P: RetryPredicate<E> + ?Sized> RetryPredicate<E> for std::sync::Arc<P> {
    fn is_retryable(&self, failure: &E) -> bool {
        (**self).is_retryable(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug)]
    enum SendError {
        LeaderNotAvailable,
        MessageTooLarge,
    }

    impl Transient for SendError {
        fn is_transient(&self) -> bool {
            matches!(self, SendError::LeaderNotAvailable)
        }
    }

    #[test]
    fn test_always_and_never() {
        let err = io::Error::other("boom");
        assert!(AlwaysRetry.is_retryable(&err));
        assert!(!NeverRetry.is_retryable(&err));
    }

    #[test]
    fn test_closure_predicate_matches_kind() {
        let predicate =
            ClosurePredicate::new(|err: &io::Error| err.kind() == io::ErrorKind::ConnectionRefused);

        assert!(predicate.is_retryable(&io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(!predicate.is_retryable(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn test_classified_uses_failure_kind() {
        assert!(Classified.is_retryable(&SendError::LeaderNotAvailable));
        assert!(!Classified.is_retryable(&SendError::MessageTooLarge));
    }

    #[test]
    fn test_boxed_predicate() {
        let boxed: Box<dyn RetryPredicate<SendError>> = Box::new(Classified);
        assert!(boxed.is_retryable(&SendError::LeaderNotAvailable));
    }
}
