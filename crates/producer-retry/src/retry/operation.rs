//! The unit of work a retry session drives.

use std::fmt;
use std::future::{Future, Ready, ready};

/// A unit of work that may fail, plus a hook that runs between attempts.
///
/// The executor never inspects what `perform` does. It only sees success or a
/// failure, and calls `before_retry` strictly after a failed attempt and
/// strictly before the next one, never before the first attempt and never
/// after a terminal failure.
///
/// # Examples
///
/// A writer that must discard a half-sent batch before trying again:
///
/// ```rust
/// use producer_retry::retry::RetryableOperation;
///
/// struct BatchWrite {
///     pending: Vec<String>,
///     sent: usize,
/// }
///
/// impl RetryableOperation for BatchWrite {
///     type Output = usize;
///     type Error = std::io::Error;
///
///     async fn perform(&mut self) -> Result<usize, std::io::Error> {
///         for message in &self.pending[self.sent..] {
///             // send(message)?;
///             let _ = message;
///             self.sent += 1;
///         }
///         Ok(self.sent)
///     }
///
///     async fn before_retry(&mut self) -> Result<(), std::io::Error> {
///         self.sent = 0;
///         Ok(())
///     }
/// }
/// ```
pub trait RetryableOperation: Send {
    /// Value produced by a successful attempt.
    type Output: Send;

    /// Failure raised by an attempt.
    type Error: Send;

    /// Perform one attempt.
    fn perform(&mut self) -> impl Future<Output = Result<Self::Output, Self::Error>> + Send;

    /// Re-prepare after a failed attempt. Defaults to doing nothing.
    ///
    /// A failure here is not retried; it ends the session as non-retryable.
    fn before_retry(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async { Ok(()) }
    }
}

/// Hook type used by [`from_fn`] until [`FnOperation::on_retry`] replaces it.
pub type NoHook<E> = fn() -> Ready<Result<(), E>>;

fn no_hook<E>() -> Ready<Result<(), E>> {
    ready(Ok(()))
}

/// Build an operation from a closure returning a future.
///
/// ```rust
/// use producer_retry::retry::{from_fn, RetryableOperation};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut op = from_fn(|| async { Ok::<_, std::io::Error>(42) });
/// assert_eq!(op.perform().await.unwrap(), 42);
/// # }
/// ```
pub fn from_fn<F, Fut, T, E>(perform: F) -> FnOperation<F, NoHook<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    FnOperation {
        perform,
        before_retry: no_hook::<E>,
    }
}

/// Closure-backed [`RetryableOperation`], created by [`from_fn`].
#[derive(Clone)]
pub struct FnOperation<F, G> {
    perform: F,
    before_retry: G,
}

impl<F, G> FnOperation<F, G> {
    /// Attach a hook run before every retry.
    pub fn on_retry<G2>(self, hook: G2) -> FnOperation<F, G2> {
        FnOperation {
            perform: self.perform,
            before_retry: hook,
        }
    }
}

impl<F, G> fmt::Debug for FnOperation<F, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperation").finish_non_exhaustive()
    }
}

impl<F, Fut, T, E, G, HookFut> RetryableOperation for FnOperation<F, G>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Send,
    G: FnMut() -> HookFut + Send,
    HookFut: Future<Output = Result<(), E>> + Send,
{
    type Output = T;
    type Error = E;

    fn perform(&mut self) -> impl Future<Output = Result<T, E>> + Send {
        (self.perform)()
    }

    fn before_retry(&mut self) -> impl Future<Output = Result<(), E>> + Send {
        (self.before_retry)()
    }
}
