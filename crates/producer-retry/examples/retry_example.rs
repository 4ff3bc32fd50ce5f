//! Example: Retrying producer writes
//!
//! This example demonstrates:
//! 1. Retrying a write until a simulated broker comes up
//! 2. Failing fast on a non-retryable error
//! 3. A supervisor that reacts to the first failed attempt
//! 4. Loading the policy from `PRODUCER_RETRY_*` variables
//!
//! Run with:
//! ```bash
//! RUST_LOG=producer_retry=debug cargo run -p producer-retry --example retry_example
//! ```

use producer_retry::prelude::*;
use producer_retry::retry::{Classified, Transient};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum SendError {
    BrokerUnavailable,
    RecordTooLarge,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::BrokerUnavailable => f.write_str("broker not available"),
            SendError::RecordTooLarge => f.write_str("record too large"),
        }
    }
}

impl std::error::Error for SendError {}

impl Transient for SendError {
    fn is_transient(&self) -> bool {
        matches!(self, SendError::BrokerUnavailable)
    }
}

/// A broker stand-in that refuses writes until it is started.
#[derive(Default)]
struct Broker {
    running: AtomicBool,
    writes: AtomicU32,
}

impl Broker {
    fn send(&self, payload: &str) -> Result<u32, SendError> {
        if payload.len() > 64 {
            return Err(SendError::RecordTooLarge);
        }
        if !self.running.load(Ordering::SeqCst) {
            return Err(SendError::BrokerUnavailable);
        }
        Ok(self.writes.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Example 1: The broker starts after three failed attempts
async fn example_wait_for_broker() -> anyhow::Result<()> {
    println!("\n=== Example 1: Retry Until the Broker Starts ===\n");

    let broker = Arc::new(Broker::default());
    let policy = DefaultRetryPolicy::new(10, Duration::from_millis(50)).with_predicate(Classified);
    let calls = AtomicU32::new(0);

    let start = Instant::now();
    let offset = RetryExecutor::new(policy)
        .run(&mut from_fn(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt == 4 {
                broker.running.store(true, Ordering::SeqCst);
            }
            let result = broker.send("hello");
            async move { result }
        }))
        .await?;

    println!("Write acknowledged at offset {}", offset);
    println!("Total attempts: {}", calls.load(Ordering::SeqCst));
    println!("Total time: {:?} (expected ~150ms)", start.elapsed());

    Ok(())
}

/// Example 2: An oversized record is never retried
async fn example_fail_fast() -> anyhow::Result<()> {
    println!("\n=== Example 2: Non-Retryable Failure ===\n");

    let broker = Broker::default();
    broker.running.store(true, Ordering::SeqCst);
    let policy = DefaultRetryPolicy::new(10, Duration::from_millis(50)).with_predicate(Classified);

    let payload = "x".repeat(128);
    let result = retry(policy, || {
        let result = broker.send(&payload);
        async move { result }
    })
    .await;

    match result {
        Err(err) => {
            println!("Error: {}", err);
            println!("Non-retryable: {}, attempts: {}", err.is_non_retryable(), err.attempts());
        }
        Ok(offset) => println!("Unexpected success at offset {}", offset),
    }

    Ok(())
}

/// Example 3: A supervisor starts the broker once the writer has failed
async fn example_supervisor() -> anyhow::Result<()> {
    println!("\n=== Example 3: Supervisor Reacting to Attempts ===\n");

    let broker = Arc::new(Broker::default());
    let writer_broker = Arc::clone(&broker);

    let handle = RetryExecutor::new(DefaultRetryPolicy::new(5, Duration::from_millis(100)))
        .with_observer(TracingObserver::new("write"))
        .spawn(from_fn(move || {
            let result = writer_broker.send("hello");
            async move { result }
        }));

    let seen = handle.state().wait_for_attempts(1).await;
    println!("Supervisor saw {} failed attempt(s), starting broker", seen);
    broker.running.store(true, Ordering::SeqCst);

    let attempts = handle.state().clone();
    let offset = handle.join().await?;
    println!(
        "Write acknowledged at offset {} after {} attempts",
        offset,
        attempts.attempt_count()
    );

    Ok(())
}

/// Example 4: Policy from the environment
async fn example_from_env() -> anyhow::Result<()> {
    println!("\n=== Example 4: Policy From Environment ===\n");

    let config = RetryConfig::from_env()?;
    println!("Loaded: {:?}", config);

    let token = CancellationToken::new();
    let executor = RetryExecutor::new(config.into_policy(Classified)?).with_cancellation(token.clone());

    // Cancel from the outside while the session waits between attempts.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let broker = Broker::default();
    let result = executor
        .run(&mut from_fn(|| {
            let result = broker.send("hello");
            async move { result }
        }))
        .await;

    if let Err(err) = result {
        println!("Error: {}", err);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("==============================================");
    println!("   Producer Retry: Execution Engine Examples");
    println!("==============================================");

    example_wait_for_broker().await?;
    example_fail_fast().await?;
    example_supervisor().await?;
    example_from_env().await?;

    println!("\n==============================================");
    println!("   All examples completed successfully!");
    println!("==============================================\n");

    Ok(())
}
