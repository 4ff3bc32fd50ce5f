//! Producer fault scenarios
//!
//! Each test runs on a paused tokio clock, so multi-second retry delays
//! complete instantly and elapsed-time assertions are deterministic.

use std::sync::Arc;
use std::time::Duration;

use producer_retry::config::{BackoffStrategy, RetryConfig};
use producer_retry::retry::{
    Classified, DefaultRetryPolicy, FixedDelay, RetryExecutor, StatsObserver,
};
use producer_retry_integration_tests::{Cluster, SendError, Writer};
use rstest::*;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

const TOPIC: &str = "events";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn assert_elapsed(started: Instant, expected: Duration) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(5),
        "expected ~{:?}, got {:?}",
        expected,
        elapsed
    );
}

fn policy(max_attempts: u32, delay: Duration) -> DefaultRetryPolicy<Classified, FixedDelay> {
    DefaultRetryPolicy::new(max_attempts, delay).with_predicate(Classified)
}

/// Fixture providing a running three-broker cluster with a fully replicated topic
#[fixture]
fn replicated_cluster() -> Arc<Cluster> {
    let cluster = Cluster::new(3);
    cluster.start_all();
    cluster
        .create_topic(TOPIC, 1, 3)
        .expect("topic should be created");
    Arc::new(cluster)
}

/// The writer starts before any broker; a supervisor starts the broker once
/// the first attempt has failed.
#[rstest]
#[case(10, Duration::from_millis(3000))]
#[case(5, Duration::from_millis(500))]
#[tokio::test(start_paused = true)]
async fn test_retry_until_broker_starts(#[case] max_attempts: u32, #[case] delay: Duration) {
    init_tracing();
    let cluster = Arc::new(Cluster::new(1));
    cluster.create_topic(TOPIC, 1, 1).unwrap();

    let mut writer = Writer::new(Arc::clone(&cluster), TOPIC, 0);
    writer.prepare("message");

    let started = Instant::now();
    let handle = RetryExecutor::new(policy(max_attempts, delay)).spawn(writer);
    let state = Arc::clone(handle.state());

    assert_eq!(state.wait_for_attempts(1).await, 1);
    assert_eq!(state.last_failure(), Some(SendError::BrokerNotAvailable));
    assert!(state.should_continue());
    assert_eq!(state.wait_duration(), delay);
    cluster.start_all();

    assert_eq!(handle.join().await.unwrap(), 0);
    assert_eq!(state.attempt_count(), 2);
    assert_elapsed(started, delay);
    assert_eq!(cluster.messages(TOPIC, 0), vec!["message"]);
}

/// Brokers are up but the topic is missing until the supervisor creates it.
#[tokio::test(start_paused = true)]
async fn test_retry_until_topic_created() {
    init_tracing();
    let cluster = Arc::new(Cluster::new(1));
    cluster.start_all();

    let mut writer = Writer::new(Arc::clone(&cluster), TOPIC, 0);
    writer.prepare("message");

    let handle = RetryExecutor::new(policy(10, Duration::from_millis(3000))).spawn(writer);
    let state = Arc::clone(handle.state());

    state.wait_for_attempts(1).await;
    assert_eq!(
        state.last_failure(),
        Some(SendError::UnknownTopic(TOPIC.to_string()))
    );
    cluster.create_topic(TOPIC, 1, 1).unwrap();

    assert_eq!(handle.join().await.unwrap(), 0);
    assert_eq!(state.attempt_count(), 2);
    assert_eq!(cluster.messages(TOPIC, 0), vec!["message"]);
}

/// The partition leader is killed after the 10th write; the write loop keeps
/// going once the writer has picked up the new leader.
#[rstest]
#[tokio::test(start_paused = true)]
async fn test_leader_killed_after_tenth_write(replicated_cluster: Arc<Cluster>) {
    init_tracing();
    let cluster = replicated_cluster;
    let original_leader = cluster.leader(TOPIC, 0).unwrap();

    let mut killed = false;
    let mut writer =
        Writer::new(Arc::clone(&cluster), TOPIC, 0).with_fault(move |cluster, acked| {
            if acked == 10 && !killed {
                killed = cluster.kill_leader(TOPIC, 0).is_some();
            }
        });

    let stats = Arc::new(StatsObserver::new());
    let executor =
        RetryExecutor::new(policy(5, Duration::from_millis(500))).with_observer(Arc::clone(&stats));

    for i in 0..100 {
        let offset = writer.write(&executor, format!("message{}", i)).await.unwrap();
        assert_eq!(offset, i);
    }

    let expected: Vec<String> = (0..100).map(|i| format!("message{}", i)).collect();
    assert_eq!(cluster.messages(TOPIC, 0), expected);
    assert_eq!(writer.acked(), 100);
    assert_eq!(writer.metadata_refreshes(), 1);
    assert_eq!(stats.failures(), 1);
    assert_eq!(stats.successes(), 100);
    assert_eq!(stats.attempt_starts(), 101);
    assert!(!cluster.running_brokers().contains(&original_leader));
    assert_ne!(writer.cached_leader(), Some(original_leader));
}

/// Without another replica the partition stays leaderless and the budget runs out.
#[tokio::test(start_paused = true)]
async fn test_leader_killed_without_replica_exhausts() {
    init_tracing();
    let cluster = Arc::new(Cluster::new(2));
    cluster.start_all();
    cluster.create_topic(TOPIC, 1, 1).unwrap();

    let mut writer = Writer::new(Arc::clone(&cluster), TOPIC, 0);
    let executor = RetryExecutor::new(policy(5, Duration::from_millis(500)));
    writer.write(&executor, "before").await.unwrap();

    cluster.kill_leader(TOPIC, 0).unwrap();
    let started = Instant::now();
    let err = writer.write(&executor, "after").await.unwrap_err();

    assert!(err.is_exhausted());
    assert_eq!(err.attempts(), 5);
    assert_eq!(
        err.into_source(),
        Some(SendError::LeaderNotAvailable {
            topic: TOPIC.to_string(),
            partition: 0
        })
    );
    assert_elapsed(started, Duration::from_millis(2000));
    assert_eq!(cluster.messages(TOPIC, 0), vec!["before"]);
}

/// Failures that cannot clear up stop the session on the first attempt.
#[rstest]
#[case::unknown_partition(99, "my message", 1024)]
#[case::oversized_message(0, "my message", 4)]
#[tokio::test(start_paused = true)]
async fn test_non_retryable_failure_fails_fast(
    #[case] partition: u32,
    #[case] message: &str,
    #[case] max_message_bytes: usize,
) {
    init_tracing();
    let cluster = Cluster::new(1).with_max_message_bytes(max_message_bytes);
    cluster.start_all();
    cluster.create_topic(TOPIC, 1, 1).unwrap();
    let cluster = Arc::new(cluster);

    let mut writer = Writer::new(Arc::clone(&cluster), TOPIC, partition);
    let started = Instant::now();
    let err = writer
        .write(&RetryExecutor::new(policy(10, Duration::from_millis(3000))), message)
        .await
        .unwrap_err();

    assert!(err.is_non_retryable());
    assert_eq!(err.attempts(), 1);
    assert_eq!(writer.metadata_refreshes(), 0);
    assert_elapsed(started, Duration::ZERO);
    assert!(cluster.messages(TOPIC, 0).is_empty());
}

/// A supervisor gives up on a broker that never starts.
#[tokio::test(start_paused = true)]
async fn test_cancel_while_waiting_for_broker() {
    init_tracing();
    let cluster = Arc::new(Cluster::new(1));
    let mut writer = Writer::new(Arc::clone(&cluster), TOPIC, 0);
    writer.prepare("message");

    let handle = RetryExecutor::new(policy(10, Duration::from_millis(3000))).spawn(writer);
    handle.state().wait_for_attempts(2).await;
    handle.cancel();

    let err = handle.join().await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 2);
    assert_eq!(err.into_source(), Some(SendError::BrokerNotAvailable));
}

/// Exponential spacing loaded from configuration.
#[tokio::test(start_paused = true)]
async fn test_configured_exponential_policy() {
    init_tracing();
    let cluster = Arc::new(Cluster::new(1));
    cluster.create_topic(TOPIC, 1, 1).unwrap();

    let config = RetryConfig {
        max_attempts: 5,
        delay_ms: 500,
        strategy: BackoffStrategy::Exponential,
        jitter: 0.0,
        ..Default::default()
    };

    let mut attempts = 0;
    let mut writer =
        Writer::new(Arc::clone(&cluster), TOPIC, 0).with_fault(move |cluster, _acked| {
            attempts += 1;
            if attempts == 3 {
                cluster.start_all();
            }
        });
    let executor = RetryExecutor::new(config.into_policy(Classified).unwrap());

    let started = Instant::now();
    assert_eq!(writer.write(&executor, "message").await.unwrap(), 0);
    assert_elapsed(started, Duration::from_millis(1500));
    assert_eq!(writer.metadata_refreshes(), 2);
}
