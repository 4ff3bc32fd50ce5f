//! Retry execution engine
//!
//! [`RetryExecutor`] drives one operation under one policy until it succeeds,
//! fails with a non-retryable failure, runs out of budget, or is cancelled
//! while waiting between attempts.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RetryError;

use super::observer::{RetryObserver, TracingObserver};
use super::operation::{RetryableOperation, from_fn};
use super::policy::{RetryDecision, RetryPolicy};
use super::state::RetryState;

/// Run a closure under `policy` until it succeeds or the policy gives up.
///
/// Shorthand for `RetryExecutor::new(policy).run(&mut from_fn(perform))`.
///
/// # Example
///
/// ```rust
/// use producer_retry::retry::{retry, DefaultRetryPolicy};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy = DefaultRetryPolicy::new(3, Duration::ZERO);
/// let value = retry(policy, || async { Ok::<_, std::io::Error>("sent") })
///     .await
///     .unwrap();
/// assert_eq!(value, "sent");
/// # }
/// ```
pub async fn retry<P, F, Fut, T, E>(policy: P, perform: F) -> Result<T, RetryError<E>>
where
    P: RetryPolicy<E>,
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Display + Send,
{
    RetryExecutor::new(policy).run(&mut from_fn(perform)).await
}

/// Drives retry sessions for one policy.
///
/// An executor is reusable: each call to [`run`](RetryExecutor::run) is an
/// independent session with its own [`RetryState`]. Each session waits on a
/// child of the executor's cancellation token: cancelling the executor ends
/// every session, cancelling a [`RetryHandle`] ends only its own.
///
/// # Example
///
/// ```rust
/// use producer_retry::retry::{from_fn, DefaultRetryPolicy, RetryExecutor, TracingObserver};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let executor = RetryExecutor::new(DefaultRetryPolicy::new(5, Duration::from_millis(1)))
///     .with_observer(TracingObserver::new("write"));
///
/// let mut calls = 0;
/// let result = executor
///     .run(&mut from_fn(|| {
///         calls += 1;
///         let attempt = calls;
///         async move {
///             if attempt < 3 {
///                 Err(std::io::Error::other("leader not available"))
///             } else {
///                 Ok(attempt)
///             }
///         }
///     }))
///     .await;
///
/// assert_eq!(result.unwrap(), 3);
/// # }
/// ```
#[derive(Debug)]
pub struct RetryExecutor<P, O = TracingObserver> {
    policy: P,
    observer: O,
    cancellation: CancellationToken,
}

impl<P> RetryExecutor<P> {
    /// Create an executor that logs through [`TracingObserver`].
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            observer: TracingObserver::default(),
            cancellation: CancellationToken::new(),
        }
    }
}

impl<P, O> RetryExecutor<P, O> {
    /// Replace the observer.
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutor<P, O2> {
        RetryExecutor {
            policy: self.policy,
            observer,
            cancellation: self.cancellation,
        }
    }

    /// Stop sessions when `token` is cancelled.
    ///
    /// Sessions only ever observe the token; they never cancel it.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The policy sessions run under.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Token that cancels this executor's sessions.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Cancel every session of this executor, current and future.
    ///
    /// Takes effect at each session's next inter-attempt wait.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Run a session with a fresh state.
    pub async fn run<Op>(&self, operation: &mut Op) -> Result<Op::Output, RetryError<Op::Error>>
    where
        Op: RetryableOperation,
        Op::Error: Display,
        P: RetryPolicy<Op::Error>,
        O: RetryObserver,
    {
        let state = RetryState::new();
        self.run_with_state(operation, &state).await
    }

    /// Run a session over a caller-owned state.
    ///
    /// The state is reset first. Keep a clone of the `Arc` it lives in to
    /// watch [`RetryState::attempt_count`] from another task or thread while
    /// the session runs. A terminal failure is moved out of the state into
    /// the returned error.
    pub async fn run_with_state<Op>(
        &self,
        operation: &mut Op,
        state: &RetryState<Op::Error>,
    ) -> Result<Op::Output, RetryError<Op::Error>>
    where
        Op: RetryableOperation,
        Op::Error: Display,
        P: RetryPolicy<Op::Error>,
        O: RetryObserver,
    {
        let session = self.cancellation.child_token();
        self.drive(operation, state, &session).await
    }

    async fn drive<Op>(
        &self,
        operation: &mut Op,
        state: &RetryState<Op::Error>,
        cancellation: &CancellationToken,
    ) -> Result<Op::Output, RetryError<Op::Error>>
    where
        Op: RetryableOperation,
        Op::Error: Display,
        P: RetryPolicy<Op::Error>,
        O: RetryObserver,
    {
        state.reset();
        let max_attempts = self.policy.max_attempts();
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            self.observer.on_attempt_start(attempt, max_attempts);

            let failure = match operation.perform().await {
                Ok(value) => {
                    state.record_success();
                    self.observer.on_success(attempt, started.elapsed());
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            state.store_failure(failure);
            let delay = match self.policy.decide(state) {
                RetryDecision::Retry { delay } => delay,
                RetryDecision::NonRetryable => {
                    state.set_decision(false, Duration::ZERO);
                    state.publish();
                    return Err(match state.take_last_failure() {
                        Some(source) => {
                            self.observer.on_non_retryable(attempt, &source);
                            RetryError::non_retryable(attempt, source)
                        }
                        None => self.lost_failure(attempt),
                    });
                }
                RetryDecision::Exhausted => {
                    state.set_decision(false, Duration::ZERO);
                    state.publish();
                    return Err(match state.take_last_failure() {
                        Some(source) => {
                            self.observer.on_exhausted(attempt, &source);
                            RetryError::exhausted(attempt, source)
                        }
                        None => self.lost_failure(attempt),
                    });
                }
            };

            state.set_decision(true, delay);
            // Report outside the state's lock, then let watchers see the attempt.
            if let Some(failure) = state.take_last_failure() {
                self.observer.on_attempt_failed(attempt, &failure, delay);
                state.restore_failure(failure);
            }
            state.publish();

            if let Err(hook_failure) = operation.before_retry().await {
                state.set_decision(false, Duration::ZERO);
                self.observer.on_non_retryable(attempt, &hook_failure);
                return Err(RetryError::non_retryable(attempt, hook_failure));
            }

            if !Self::wait(cancellation, delay).await {
                state.set_decision(false, Duration::ZERO);
                self.observer.on_cancelled(attempt);
                return Err(RetryError::cancelled(attempt, state.take_last_failure()));
            }
        }
    }

    /// Run the session on the tokio runtime and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<Op>(self, mut operation: Op) -> RetryHandle<Op::Output, Op::Error>
    where
        Op: RetryableOperation + 'static,
        Op::Output: 'static,
        Op::Error: Display + 'static,
        P: RetryPolicy<Op::Error> + 'static,
        O: RetryObserver + 'static,
    {
        let state = Arc::new(RetryState::new());
        let cancellation = self.cancellation.child_token();
        let session = cancellation.clone();
        let session_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            self.drive(&mut operation, &session_state, &session).await
        });

        RetryHandle {
            state,
            cancellation,
            task,
        }
    }

    /// Sleep for `delay` unless cancelled first. Returns false on cancellation.
    async fn wait(cancellation: &CancellationToken, delay: Duration) -> bool {
        if cancellation.is_cancelled() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    // The state was reset by another holder mid-session; the failure is gone.
    fn lost_failure<E>(&self, attempt: u32) -> RetryError<E>
    where
        O: RetryObserver,
    {
        self.observer.on_cancelled(attempt);
        RetryError::cancelled(attempt, None)
    }
}

/// Handle to a session started with [`RetryExecutor::spawn`].
#[derive(Debug)]
pub struct RetryHandle<T, E> {
    state: Arc<RetryState<E>>,
    cancellation: CancellationToken,
    task: JoinHandle<Result<T, RetryError<E>>>,
}

impl<T, E> RetryHandle<T, E> {
    /// Live bookkeeping of the running session.
    pub fn state(&self) -> &Arc<RetryState<E>> {
        &self.state
    }

    /// Attempts completed so far.
    pub fn attempt_count(&self) -> u32 {
        self.state.attempt_count()
    }

    /// Cancel this session only. Takes effect at its next inter-attempt wait.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether the session has reached a terminal outcome.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session's outcome.
    ///
    /// A panic inside the operation is resumed on the caller.
    pub async fn join(self) -> Result<T, RetryError<E>> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(RetryError::cancelled(
                self.state.attempt_count(),
                self.state.take_last_failure(),
            )),
        }
    }
}
