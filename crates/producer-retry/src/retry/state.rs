//! Per-session retry bookkeeping.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Mutable bookkeeping owned by one retry session.
///
/// The executor is the only writer. Every accessor takes `&self` and is safe
/// to call from another thread or task while the session runs, which is how a
/// supervisor learns that the producer has started retrying:
///
/// ```rust
/// use producer_retry::retry::RetryState;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let state: Arc<RetryState<std::io::Error>> = Arc::new(RetryState::new());
/// let watcher = Arc::clone(&state);
/// let supervisor = tokio::spawn(async move { watcher.wait_for_attempts(1).await });
///
/// state.record_failure(std::io::Error::other("broker unavailable"));
/// assert_eq!(supervisor.await.unwrap(), 1);
/// # }
/// ```
///
/// A state may be reset and reused for a new session, but never shared by two
/// sessions running at the same time.
pub struct RetryState<E> {
    attempts: AtomicU32,
    wait_nanos: AtomicU64,
    should_continue: AtomicBool,
    last_failure: Mutex<Option<E>>,
    progress: watch::Sender<u32>,
}

impl<E> RetryState<E> {
    /// A state for a fresh session: no attempts, no failure.
    pub fn new() -> Self {
        Self {
            attempts: AtomicU32::new(0),
            wait_nanos: AtomicU64::new(0),
            should_continue: AtomicBool::new(false),
            last_failure: Mutex::new(None),
            progress: watch::Sender::new(0),
        }
    }

    /// Store the failure of the attempt that just finished and count it.
    ///
    /// Called exactly once per failed attempt, before the policy is consulted.
    pub fn record_failure(&self, failure: E) {
        self.store_failure(failure);
        self.publish();
    }

    /// Count the successful final attempt and stop the session.
    pub fn record_success(&self) {
        self.should_continue.store(false, Ordering::Release);
        self.wait_nanos.store(0, Ordering::Release);
        self.attempts.fetch_add(1, Ordering::AcqRel);
        self.publish();
    }

    /// Return to the initial values so the state can back a new session.
    pub fn reset(&self) {
        *self.failure_slot() = None;
        self.should_continue.store(false, Ordering::Release);
        self.wait_nanos.store(0, Ordering::Release);
        self.attempts.store(0, Ordering::Release);
        self.progress.send_replace(0);
    }

    /// Attempts completed so far in this session.
    ///
    /// While the session is running this equals the number of failed
    /// attempts; once it has succeeded the final attempt is included.
    /// A newly counted failure may show here before its decision is stored;
    /// [`wait_for_attempts`](Self::wait_for_attempts) only resolves after.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// A copy of the most recent failure, if one is stored.
    pub fn last_failure(&self) -> Option<E>
    where
        E: Clone,
    {
        self.failure_slot().clone()
    }

    /// Inspect the most recent failure without cloning it.
    pub fn with_last_failure<R>(&self, f: impl FnOnce(Option<&E>) -> R) -> R {
        f(self.failure_slot().as_ref())
    }

    /// Whether a failure is currently stored.
    pub fn has_failure(&self) -> bool {
        self.failure_slot().is_some()
    }

    /// Wait computed by the policy for the upcoming retry.
    pub fn wait_duration(&self) -> Duration {
        Duration::from_nanos(self.wait_nanos.load(Ordering::Acquire))
    }

    /// Whether the policy allowed another attempt after the last failure.
    pub fn should_continue(&self) -> bool {
        self.should_continue.load(Ordering::Acquire)
    }

    /// Resolve once at least `attempts` attempts have completed.
    ///
    /// Returns the attempt count observed when the wait ended.
    pub async fn wait_for_attempts(&self, attempts: u32) -> u32 {
        let mut progress = self.progress.subscribe();
        match progress.wait_for(|&count| count >= attempts).await {
            Ok(count) => *count,
            // The sender lives as long as `self`; this arm is unreachable.
            Err(_) => self.attempt_count(),
        }
    }

    pub(crate) fn set_decision(&self, should_continue: bool, wait: Duration) {
        let nanos = u64::try_from(wait.as_nanos()).unwrap_or(u64::MAX);
        self.wait_nanos.store(nanos, Ordering::Release);
        self.should_continue.store(should_continue, Ordering::Release);
    }

    /// Move the stored failure out; terminal outcomes own it from then on.
    pub(crate) fn take_last_failure(&self) -> Option<E> {
        self.failure_slot().take()
    }

    /// Store and count a failure without waking `wait_for_attempts` callers.
    ///
    /// The executor publishes once the decision is stored, so watchers never
    /// see a counted failure without its decision.
    pub(crate) fn store_failure(&self, failure: E) {
        *self.failure_slot() = Some(failure);
        self.attempts.fetch_add(1, Ordering::AcqRel);
    }

    /// Put back a failure taken with [`take_last_failure`](Self::take_last_failure).
    pub(crate) fn restore_failure(&self, failure: E) {
        *self.failure_slot() = Some(failure);
    }

    /// Wake `wait_for_attempts` callers with the current count.
    pub(crate) fn publish(&self) {
        self.progress.send_replace(self.attempt_count());
    }

    fn failure_slot(&self) -> MutexGuard<'_, Option<E>> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Default for RetryState<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for RetryState<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryState")
            .field("attempts", &self.attempt_count())
            .field("wait_duration", &self.wait_duration())
            .field("should_continue", &self.should_continue())
            .field("has_failure", &self.has_failure())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_state_is_empty() {
        let state: RetryState<String> = RetryState::new();
        assert_eq!(state.attempt_count(), 0);
        assert!(state.last_failure().is_none());
        assert!(!state.should_continue());
        assert_eq!(state.wait_duration(), Duration::ZERO);
    }

    #[test]
    fn test_record_failure_replaces_previous() {
        let state = RetryState::new();
        state.record_failure("first".to_string());
        state.record_failure("second".to_string());

        assert_eq!(state.attempt_count(), 2);
        assert_eq!(state.last_failure().as_deref(), Some("second"));
        assert!(state.with_last_failure(|f| f.is_some_and(|s| s == "second")));
    }

    #[test]
    fn test_record_success_counts_final_attempt() {
        let state = RetryState::new();
        state.record_failure("transient".to_string());
        state.set_decision(true, Duration::from_millis(10));
        state.record_success();

        assert_eq!(state.attempt_count(), 2);
        assert!(!state.should_continue());
        assert_eq!(state.wait_duration(), Duration::ZERO);
    }

    #[test]
    fn test_reset_matches_fresh_state() {
        let state = RetryState::new();
        state.record_failure("stale".to_string());
        state.set_decision(true, Duration::from_secs(3));
        state.reset();

        let fresh: RetryState<String> = RetryState::new();
        assert_eq!(state.attempt_count(), fresh.attempt_count());
        assert_eq!(state.last_failure(), fresh.last_failure());
        assert_eq!(state.should_continue(), fresh.should_continue());
        assert_eq!(state.wait_duration(), fresh.wait_duration());
    }

    #[test]
    fn test_take_last_failure_empties_slot() {
        let state = RetryState::new();
        state.record_failure(7u32);
        assert_eq!(state.take_last_failure(), Some(7));
        assert!(!state.has_failure());
        assert_eq!(state.attempt_count(), 1);
    }

    #[test]
    fn test_counter_visible_across_threads() {
        let state: Arc<RetryState<u32>> = Arc::new(RetryState::new());
        let writer = Arc::clone(&state);

        std::thread::spawn(move || {
            for i in 0..100 {
                writer.record_failure(i);
            }
        })
        .join()
        .unwrap();

        assert_eq!(state.attempt_count(), 100);
        assert_eq!(state.last_failure(), Some(99));
    }

    #[tokio::test]
    async fn test_wait_for_attempts_resolves_on_progress() {
        let state: Arc<RetryState<&'static str>> = Arc::new(RetryState::new());
        let watcher = Arc::clone(&state);
        let waiter = tokio::spawn(async move { watcher.wait_for_attempts(2).await });

        state.record_failure("one");
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        state.record_failure("two");
        assert_eq!(waiter.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_wait_for_attempts_already_reached() {
        let state = RetryState::new();
        state.record_failure(());
        state.record_failure(());
        assert_eq!(state.wait_for_attempts(1).await, 2);
    }

    #[tokio::test]
    async fn test_stored_failure_waits_for_its_decision() {
        let state: Arc<RetryState<&'static str>> = Arc::new(RetryState::new());
        let watcher = Arc::clone(&state);
        let waiter = tokio::spawn(async move {
            watcher.wait_for_attempts(1).await;
            (watcher.should_continue(), watcher.wait_duration())
        });

        state.store_failure("broker not available");
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        assert_eq!(state.attempt_count(), 1);

        state.set_decision(true, Duration::from_secs(3));
        state.publish();
        assert_eq!(waiter.await.unwrap(), (true, Duration::from_secs(3)));
    }
}
