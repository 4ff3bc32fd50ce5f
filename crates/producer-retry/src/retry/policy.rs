//! Retry policies: whether another attempt is allowed, and when.

use super::backoff::{Backoff, FixedDelay};
use super::predicate::{AlwaysRetry, ClosurePredicate, RetryPredicate};
use super::state::RetryState;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of consulting a policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run `before_retry`, wait `delay`, then attempt again.
    Retry {
        /// Wait before the next attempt.
        delay: Duration,
    },
    /// The failure kind is not retryable. Terminal regardless of budget.
    NonRetryable,
    /// The failure was retryable but the attempt budget is spent.
    Exhausted,
}

impl RetryDecision {
    /// Whether another attempt follows.
    pub fn is_retry(&self) -> bool {
        matches!(self, RetryDecision::Retry { .. })
    }
}

/// Decision logic for a retry session.
///
/// Policies are read-only with respect to the state and hold no counters,
/// so one instance may back any number of concurrent sessions.
///
/// Implementors provide the budget, the classification, and the delay;
/// [`decide`](RetryPolicy::decide) combines them and is what the executor
/// calls. The non-retryable check always wins over the budget check, so a
/// permanently broken operation is never reported as merely exhausted.
pub trait RetryPolicy<E>: Send + Sync {
    /// Attempt budget. Zero means the operation runs once and is never retried.
    fn max_attempts(&self) -> u32;

    /// Whether a failure of this kind may be retried.
    fn is_retryable(&self, failure: &E) -> bool;

    /// Wait before the next attempt, given the state after a failure.
    fn next_delay(&self, state: &RetryState<E>) -> Duration;

    /// Whether another attempt is permitted.
    ///
    /// False when the last failure is not retryable or when the attempt
    /// count has reached the budget.
    fn should_retry(&self, state: &RetryState<E>) -> bool {
        state.with_last_failure(|failure| failure.is_some_and(|f| self.is_retryable(f)))
            && state.attempt_count() < self.max_attempts()
    }

    /// Classify the state after a failure into a [`RetryDecision`].
    fn decide(&self, state: &RetryState<E>) -> RetryDecision {
        let retryable =
            state.with_last_failure(|failure| failure.is_some_and(|f| self.is_retryable(f)));
        if !retryable {
            RetryDecision::NonRetryable
        } else if state.attempt_count() >= self.max_attempts() {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry {
                delay: self.next_delay(state),
            }
        }
    }
}

impl<E, T: RetryPolicy<E> + ?Sized> RetryPolicy<E> for &T {
    fn max_attempts(&self) -> u32 {
        (**self).max_attempts()
    }

    fn is_retryable(&self, failure: &E) -> bool {
        (**self).is_retryable(failure)
    }

    fn next_delay(&self, state: &RetryState<E>) -> Duration {
        (**self).next_delay(state)
    }

    fn should_retry(&self, state: &RetryState<E>) -> bool {
        (**self).should_retry(state)
    }

    fn decide(&self, state: &RetryState<E>) -> RetryDecision {
        (**self).decide(state)
    }
}

impl<E, T: RetryPolicy<E> + ?Sized> RetryPolicy<E> for Arc<T> {
    fn max_attempts(&self) -> u32 {
        (**self).max_attempts()
    }

    fn is_retryable(&self, failure: &E) -> bool {
        (**self).is_retryable(failure)
    }

    fn next_delay(&self, state: &RetryState<E>) -> Duration {
        (**self).next_delay(state)
    }

    fn should_retry(&self, state: &RetryState<E>) -> bool {
        (**self).should_retry(state)
    }

    fn decide(&self, state: &RetryState<E>) -> RetryDecision {
        (**self).decide(state)
    }
}

/// The standard policy: an attempt budget, a failure predicate, and a
/// backoff strategy.
///
/// Out of the box it retries every failure with a fixed delay; narrow it with
/// [`retry_if`](DefaultRetryPolicy::retry_if) or
/// [`with_predicate`](DefaultRetryPolicy::with_predicate).
///
/// # Examples
///
/// ```rust
/// use producer_retry::retry::{DefaultRetryPolicy, ExponentialBackoff, RetryPolicy};
/// use std::io;
/// use std::time::Duration;
///
/// // Ten attempts, three seconds apart, only for refused connections.
/// let policy = DefaultRetryPolicy::new(10, Duration::from_secs(3))
///     .retry_if(|err: &io::Error| err.kind() == io::ErrorKind::ConnectionRefused);
/// assert_eq!(RetryPolicy::<io::Error>::max_attempts(&policy), 10);
///
/// // Same predicate, exponential spacing.
/// let policy = policy.with_backoff(ExponentialBackoff::default());
/// ```
#[derive(Debug, Clone)]
pub struct DefaultRetryPolicy<P = AlwaysRetry, B = FixedDelay> {
    max_attempts: u32,
    predicate: P,
    backoff: B,
}

impl DefaultRetryPolicy {
    /// Retry any failure up to `max_attempts` times, `delay` apart.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            predicate: AlwaysRetry,
            backoff: FixedDelay::new(delay),
        }
    }
}

impl Default for DefaultRetryPolicy {
    /// Ten attempts, three seconds apart.
    fn default() -> Self {
        Self::new(10, Duration::from_secs(3))
    }
}

impl<P, B> DefaultRetryPolicy<P, B> {
    /// Assemble a policy from its parts.
    pub fn from_parts(max_attempts: u32, predicate: P, backoff: B) -> Self {
        Self {
            max_attempts,
            predicate,
            backoff,
        }
    }

    /// Replace the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Replace the failure predicate.
    pub fn with_predicate<P2>(self, predicate: P2) -> DefaultRetryPolicy<P2, B> {
        DefaultRetryPolicy {
            max_attempts: self.max_attempts,
            predicate,
            backoff: self.backoff,
        }
    }

    /// Retry only the failures for which `predicate` returns true.
    pub fn retry_if<F>(self, predicate: F) -> DefaultRetryPolicy<ClosurePredicate<F>, B> {
        self.with_predicate(ClosurePredicate::new(predicate))
    }

    /// Replace the backoff strategy.
    pub fn with_backoff<B2>(self, backoff: B2) -> DefaultRetryPolicy<P, B2> {
        DefaultRetryPolicy {
            max_attempts: self.max_attempts,
            predicate: self.predicate,
            backoff,
        }
    }

    /// The configured predicate.
    pub fn predicate(&self) -> &P {
        &self.predicate
    }

    /// The configured backoff.
    pub fn backoff(&self) -> &B {
        &self.backoff
    }
}

impl<E, P, B> RetryPolicy<E> for DefaultRetryPolicy<P, B>
where
    P: RetryPredicate<E>,
    B: Backoff,
{
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn is_retryable(&self, failure: &E) -> bool {
        self.predicate.is_retryable(failure)
    }

    fn next_delay(&self, state: &RetryState<E>) -> Duration {
        self.backoff.next_delay(state.attempt_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::backoff::LinearBackoff;
    use proptest::prelude::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Failure {
        Transient,
        Permanent,
    }

    fn transient_only(max_attempts: u32) -> impl RetryPolicy<Failure> {
        DefaultRetryPolicy::new(max_attempts, Duration::ZERO)
            .retry_if(|f: &Failure| *f == Failure::Transient)
    }

    fn state_with(failures: &[Failure]) -> RetryState<Failure> {
        let state = RetryState::new();
        for failure in failures {
            state.record_failure(failure.clone());
        }
        state
    }

    #[test]
    fn test_retry_while_budget_remains() {
        let policy = transient_only(3);
        let state = state_with(&[Failure::Transient, Failure::Transient]);

        assert!(policy.should_retry(&state));
        assert_eq!(
            policy.decide(&state),
            RetryDecision::Retry {
                delay: Duration::ZERO
            }
        );
    }

    #[test]
    fn test_exhausted_at_budget() {
        let policy = transient_only(3);
        let state = state_with(&[Failure::Transient, Failure::Transient, Failure::Transient]);

        assert!(!policy.should_retry(&state));
        assert_eq!(policy.decide(&state), RetryDecision::Exhausted);
    }

    #[test]
    fn test_non_matching_kind_is_terminal_with_budget_left() {
        let policy = transient_only(5);
        let state = state_with(&[Failure::Permanent]);

        assert!(!policy.should_retry(&state));
        assert_eq!(policy.decide(&state), RetryDecision::NonRetryable);
    }

    #[test]
    fn test_non_retryable_wins_over_exhaustion() {
        let policy = transient_only(1);
        let state = state_with(&[Failure::Permanent]);

        assert_eq!(policy.decide(&state), RetryDecision::NonRetryable);
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let policy = transient_only(0);
        let state = state_with(&[Failure::Transient]);

        assert_eq!(policy.decide(&state), RetryDecision::Exhausted);
    }

    #[test]
    fn test_missing_failure_is_not_retryable() {
        let policy = transient_only(3);
        let state = RetryState::new();

        assert_eq!(policy.decide(&state), RetryDecision::NonRetryable);
    }

    #[test]
    fn test_delay_comes_from_backoff() {
        let policy = DefaultRetryPolicy::new(10, Duration::ZERO).with_backoff(LinearBackoff::new(
            Duration::from_millis(100),
            Duration::from_secs(1),
        ));
        let state = state_with(&[Failure::Transient, Failure::Transient]);

        assert_eq!(
            policy.decide(&state),
            RetryDecision::Retry {
                delay: Duration::from_millis(200)
            }
        );
    }

    #[test]
    fn test_shared_policy_through_arc() {
        let policy = Arc::new(transient_only(2));
        let state = state_with(&[Failure::Transient]);

        assert!(policy.should_retry(&state));
        assert!(Arc::clone(&policy).decide(&state).is_retry());
    }

    proptest! {
        /// Property: a retryable failure is retried exactly while count < max
        #[test]
        fn prop_budget_boundary(max_attempts in 0u32..50, failures in 1usize..60) {
            let policy = transient_only(max_attempts);
            let state = state_with(&vec![Failure::Transient; failures]);

            let decision = policy.decide(&state);
            if (failures as u32) < max_attempts {
                prop_assert!(decision.is_retry());
            } else {
                prop_assert_eq!(decision, RetryDecision::Exhausted);
            }
        }

        /// Property: a non-matching failure is terminal for any budget
        #[test]
        fn prop_permanent_always_terminal(max_attempts in 0u32..1_000) {
            let policy = transient_only(max_attempts);
            let state = state_with(&[Failure::Permanent]);
            prop_assert_eq!(policy.decide(&state), RetryDecision::NonRetryable);
        }
    }
}
