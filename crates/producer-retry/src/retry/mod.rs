//! Retry execution engine.
//!
//! A session runs one [`RetryableOperation`] under one [`RetryPolicy`]:
//! perform, classify the failure, wait, and repeat until success or a
//! terminal [`RetryError`](crate::error::RetryError).
//!
//! # Key Types
//!
//! - [`RetryPolicy`] / [`DefaultRetryPolicy`] - attempt budget, failure predicate, backoff
//! - [`Backoff`] - fixed, linear, and exponential delay strategies
//! - [`RetryState`] - per-session bookkeeping, observable from other threads
//! - [`RetryExecutor`] - drives sessions, inline or spawned
//! - [`RetryObserver`] - lifecycle callbacks, logged by [`TracingObserver`]
//!
//! # Examples
//!
//! ```rust
//! use producer_retry::retry::{from_fn, DefaultRetryPolicy, RetryExecutor};
//! use std::io;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let policy = DefaultRetryPolicy::new(3, Duration::ZERO)
//!     .retry_if(|err: &io::Error| err.kind() == io::ErrorKind::ConnectionRefused);
//!
//! let err = RetryExecutor::new(policy)
//!     .run(&mut from_fn(|| async {
//!         Err::<(), _>(io::Error::from(io::ErrorKind::PermissionDenied))
//!     }))
//!     .await
//!     .unwrap_err();
//!
//! // Not a refused connection: fatal on the first attempt.
//! assert!(err.is_non_retryable());
//! assert_eq!(err.attempts(), 1);
//! # }
//! ```

mod backoff;
mod executor;
mod observer;
mod operation;
mod policy;
mod predicate;
mod state;

pub use backoff::{Backoff, ExponentialBackoff, ExponentialBackoffBuilder, FixedDelay, LinearBackoff};
pub use executor::{RetryExecutor, RetryHandle, retry};
pub use observer::{NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use operation::{FnOperation, NoHook, RetryableOperation, from_fn};
pub use policy::{DefaultRetryPolicy, RetryDecision, RetryPolicy};
pub use predicate::{AlwaysRetry, Classified, ClosurePredicate, NeverRetry, RetryPredicate, Transient};
pub use state::RetryState;
