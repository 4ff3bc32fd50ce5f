#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Retry execution engine for message-broker producers.
//!
//! A producer that writes through broker restarts, missing topics and leader
//! failover wraps each write in a retry session:
//!
//! - **Policies** decide whether a failure is retried and how long to wait,
//!   via [`RetryPolicy`](retry::RetryPolicy) and [`DefaultRetryPolicy`](retry::DefaultRetryPolicy)
//! - **Backoff** strategies space the attempts: fixed, linear, exponential with jitter
//! - **Sessions** expose their [`RetryState`](retry::RetryState) so a supervisor
//!   can watch the attempt count and react, e.g. start a broker
//! - **Cancellation** ends a session between attempts through a `CancellationToken`
//! - **Configuration** loads from serde formats or `PRODUCER_RETRY_*` variables
//!
//! # Examples
//!
//! Using the prelude for convenient imports:
//!
//! ```rust
//! use producer_retry::prelude::*;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = DefaultRetryPolicy::new(5, Duration::from_millis(10));
//! let mut calls = 0;
//!
//! let value = RetryExecutor::new(policy)
//!     .run(&mut from_fn(|| {
//!         calls += 1;
//!         let attempt = calls;
//!         async move {
//!             if attempt < 3 {
//!                 Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
//!             } else {
//!                 Ok(attempt)
//!             }
//!         }
//!     }))
//!     .await?;
//!
//! assert_eq!(value, 3);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod retry;

pub use error::{ConfigError, RetryError};

/// Convenient re-exports of commonly used items.
///
/// ```rust
/// use producer_retry::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{BackoffStrategy, RetryConfig};
    pub use crate::error::{ConfigError, RetryError};
    pub use crate::retry::{
        Backoff, DefaultRetryPolicy, ExponentialBackoff, FixedDelay, LinearBackoff, RetryExecutor,
        RetryHandle, RetryPolicy, RetryState, RetryableOperation, TracingObserver, from_fn, retry,
    };
    pub use tokio_util::sync::CancellationToken;
}
