//! In-memory broker cluster
//!
//! Models just enough of a partitioned log for producer fault scenarios:
//! brokers that can be stopped and started, topics with replicated
//! partitions, and leader failover when a leader goes away.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use producer_retry::retry::Transient;

/// Broker identifier, starting at 1.
pub type BrokerId = u32;

/// Largest message the cluster accepts, in bytes.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024;

/// Failures a producer can see while writing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// No broker in the cluster is running.
    #[error("no broker available")]
    BrokerNotAvailable,

    /// The addressed broker is stopped.
    #[error("broker {0} is not running")]
    BrokerDown(BrokerId),

    /// The topic has not been created yet.
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),

    /// The topic exists but has no such partition.
    #[error("topic '{topic}' has {partitions} partitions, no partition {partition}")]
    InvalidPartition {
        /// Topic name
        topic: String,
        /// Requested partition
        partition: u32,
        /// Partitions the topic has
        partitions: u32,
    },

    /// No live replica can lead the partition.
    #[error("leader not available for {topic}-{partition}")]
    LeaderNotAvailable {
        /// Topic name
        topic: String,
        /// Partition index
        partition: u32,
    },

    /// The addressed broker no longer leads the partition.
    #[error("broker {broker} is not the leader for {topic}-{partition}")]
    NotLeaderForPartition {
        /// Broker that was addressed
        broker: BrokerId,
        /// Topic name
        topic: String,
        /// Partition index
        partition: u32,
    },

    /// The message exceeds the broker's size limit.
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    MessageTooLarge {
        /// Message size
        size: usize,
        /// Configured limit
        max: usize,
    },
}

impl Transient for SendError {
    fn is_transient(&self) -> bool {
        match self {
            SendError::BrokerNotAvailable
            | SendError::BrokerDown(_)
            | SendError::UnknownTopic(_)
            | SendError::LeaderNotAvailable { .. }
            | SendError::NotLeaderForPartition { .. } => true,
            SendError::InvalidPartition { .. } | SendError::MessageTooLarge { .. } => false,
        }
    }
}

/// Administrative failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdminError {
    /// A topic with this name already exists.
    #[error("topic '{0}' already exists")]
    TopicExists(String),

    /// Replication factor is zero or larger than the broker count.
    #[error("replication factor {requested} is invalid for {brokers} brokers")]
    InvalidReplication {
        /// Requested factor
        requested: u32,
        /// Brokers in the cluster
        brokers: u32,
    },

    /// A topic needs at least one partition.
    #[error("a topic needs at least one partition")]
    NoPartitions,

    /// No broker with this id.
    #[error("unknown broker {0}")]
    UnknownBroker(BrokerId),
}

#[derive(Debug)]
struct Partition {
    replicas: Vec<BrokerId>,
    leader: Option<BrokerId>,
    log: Vec<String>,
}

#[derive(Debug)]
struct Inner {
    brokers: BTreeMap<BrokerId, bool>,
    topics: HashMap<String, Vec<Partition>>,
    max_message_bytes: usize,
}

impl Inner {
    fn running(&self, broker: BrokerId) -> bool {
        self.brokers.get(&broker).copied().unwrap_or(false)
    }

    fn any_running(&self) -> bool {
        self.brokers.values().any(|running| *running)
    }

    fn partition(&self, topic: &str, partition: u32) -> Result<&Partition, SendError> {
        let partitions = self
            .topics
            .get(topic)
            .ok_or_else(|| SendError::UnknownTopic(topic.to_string()))?;
        partitions
            .get(partition as usize)
            .ok_or_else(|| SendError::InvalidPartition {
                topic: topic.to_string(),
                partition,
                partitions: partitions.len() as u32,
            })
    }

    // Give every leaderless partition the first running replica.
    fn elect_leaders(&mut self) {
        let brokers = &self.brokers;
        for (topic, partitions) in self.topics.iter_mut() {
            for (index, partition) in partitions.iter_mut().enumerate() {
                if partition.leader.is_some() {
                    continue;
                }
                partition.leader = partition
                    .replicas
                    .iter()
                    .copied()
                    .find(|replica| brokers.get(replica).copied().unwrap_or(false));
                if let Some(leader) = partition.leader {
                    tracing::info!(topic = %topic, partition = index, leader, "leader elected");
                }
            }
        }
    }
}

/// A cluster of in-memory brokers.
///
/// Brokers start stopped. Share the cluster between the writer under test
/// and the scenario's supervisor through an `Arc`.
#[derive(Debug)]
pub struct Cluster {
    inner: Mutex<Inner>,
}

impl Cluster {
    /// A cluster of `brokers` stopped brokers with ids `1..=brokers`.
    pub fn new(brokers: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                brokers: (1..=brokers).map(|id| (id, false)).collect(),
                topics: HashMap::new(),
                max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            }),
        }
    }

    /// Override the message size limit.
    pub fn with_max_message_bytes(self, max: usize) -> Self {
        self.lock().max_message_bytes = max;
        self
    }

    /// Start every broker.
    pub fn start_all(&self) {
        let mut inner = self.lock();
        for running in inner.brokers.values_mut() {
            *running = true;
        }
        tracing::info!(brokers = inner.brokers.len(), "all brokers started");
        inner.elect_leaders();
    }

    /// Start one broker. Leaderless partitions it replicates elect it.
    pub fn start_broker(&self, broker: BrokerId) -> Result<(), AdminError> {
        let mut inner = self.lock();
        let running = inner
            .brokers
            .get_mut(&broker)
            .ok_or(AdminError::UnknownBroker(broker))?;
        *running = true;
        tracing::info!(broker, "broker started");
        inner.elect_leaders();
        Ok(())
    }

    /// Stop one broker. Partitions it led fail over to a running replica.
    pub fn stop_broker(&self, broker: BrokerId) -> Result<(), AdminError> {
        let mut inner = self.lock();
        let running = inner
            .brokers
            .get_mut(&broker)
            .ok_or(AdminError::UnknownBroker(broker))?;
        *running = false;
        tracing::info!(broker, "broker stopped");

        for partitions in inner.topics.values_mut() {
            for partition in partitions.iter_mut() {
                if partition.leader == Some(broker) {
                    partition.leader = None;
                }
            }
        }
        inner.elect_leaders();
        Ok(())
    }

    /// Stop the leader of a partition, returning its id.
    pub fn kill_leader(&self, topic: &str, partition: u32) -> Option<BrokerId> {
        let leader = self.leader(topic, partition)?;
        self.stop_broker(leader).ok()?;
        Some(leader)
    }

    /// Ids of the running brokers.
    pub fn running_brokers(&self) -> Vec<BrokerId> {
        self.lock()
            .brokers
            .iter()
            .filter_map(|(id, running)| running.then_some(*id))
            .collect()
    }

    /// Create a topic with replicas assigned round-robin over all brokers.
    pub fn create_topic(
        &self,
        topic: &str,
        partitions: u32,
        replication: u32,
    ) -> Result<(), AdminError> {
        let mut inner = self.lock();
        let brokers: Vec<BrokerId> = inner.brokers.keys().copied().collect();

        if partitions == 0 {
            return Err(AdminError::NoPartitions);
        }
        if replication == 0 || replication as usize > brokers.len() {
            return Err(AdminError::InvalidReplication {
                requested: replication,
                brokers: brokers.len() as u32,
            });
        }
        if inner.topics.contains_key(topic) {
            return Err(AdminError::TopicExists(topic.to_string()));
        }

        let assignment = (0..partitions as usize)
            .map(|index| Partition {
                replicas: (0..replication as usize)
                    .map(|offset| brokers[(index + offset) % brokers.len()])
                    .collect(),
                leader: None,
                log: Vec::new(),
            })
            .collect();
        inner.topics.insert(topic.to_string(), assignment);
        tracing::info!(topic, partitions, replication, "topic created");
        inner.elect_leaders();
        Ok(())
    }

    /// Current leader of a partition, if it has one.
    pub fn leader(&self, topic: &str, partition: u32) -> Option<BrokerId> {
        self.lock()
            .partition(topic, partition)
            .ok()
            .and_then(|p| p.leader)
    }

    /// Metadata lookup a producer performs before sending.
    pub fn find_leader(&self, topic: &str, partition: u32) -> Result<BrokerId, SendError> {
        let inner = self.lock();
        if !inner.any_running() {
            return Err(SendError::BrokerNotAvailable);
        }
        inner
            .partition(topic, partition)?
            .leader
            .ok_or_else(|| SendError::LeaderNotAvailable {
                topic: topic.to_string(),
                partition,
            })
    }

    /// Append `message` through `broker`, returning its offset.
    pub fn produce(
        &self,
        broker: BrokerId,
        topic: &str,
        partition: u32,
        message: &str,
    ) -> Result<u64, SendError> {
        let mut inner = self.lock();
        if message.len() > inner.max_message_bytes {
            return Err(SendError::MessageTooLarge {
                size: message.len(),
                max: inner.max_message_bytes,
            });
        }
        if !inner.running(broker) {
            return Err(SendError::BrokerDown(broker));
        }
        if inner.partition(topic, partition)?.leader != Some(broker) {
            return Err(SendError::NotLeaderForPartition {
                broker,
                topic: topic.to_string(),
                partition,
            });
        }

        // Looked up above; the partition exists.
        let log = match inner
            .topics
            .get_mut(topic)
            .and_then(|partitions| partitions.get_mut(partition as usize))
        {
            Some(partition) => &mut partition.log,
            None => return Err(SendError::UnknownTopic(topic.to_string())),
        };
        log.push(message.to_string());
        Ok(log.len() as u64 - 1)
    }

    /// Every message appended to a partition, in order.
    pub fn messages(&self, topic: &str, partition: u32) -> Vec<String> {
        self.lock()
            .partition(topic, partition)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_cluster(brokers: u32) -> Cluster {
        let cluster = Cluster::new(brokers);
        cluster.start_all();
        cluster
    }

    #[test]
    fn test_stopped_cluster_refuses_metadata() {
        let cluster = Cluster::new(1);
        cluster.create_topic("events", 1, 1).unwrap();
        assert_eq!(
            cluster.find_leader("events", 0),
            Err(SendError::BrokerNotAvailable)
        );
    }

    #[test]
    fn test_start_elects_leader() {
        let cluster = Cluster::new(2);
        cluster.create_topic("events", 2, 1).unwrap();
        assert_eq!(cluster.leader("events", 0), None);

        cluster.start_broker(2).unwrap();
        assert_eq!(cluster.leader("events", 0), None);
        assert_eq!(cluster.leader("events", 1), Some(2));
        assert!(matches!(
            cluster.find_leader("events", 0),
            Err(SendError::LeaderNotAvailable { .. })
        ));
    }

    #[test]
    fn test_produce_appends_in_order() {
        let cluster = running_cluster(1);
        cluster.create_topic("events", 1, 1).unwrap();
        let leader = cluster.find_leader("events", 0).unwrap();

        assert_eq!(cluster.produce(leader, "events", 0, "a"), Ok(0));
        assert_eq!(cluster.produce(leader, "events", 0, "b"), Ok(1));
        assert_eq!(cluster.messages("events", 0), vec!["a", "b"]);
    }

    #[test]
    fn test_kill_leader_fails_over() {
        let cluster = running_cluster(3);
        cluster.create_topic("events", 1, 2).unwrap();
        let old = cluster.find_leader("events", 0).unwrap();

        assert_eq!(cluster.kill_leader("events", 0), Some(old));
        let new = cluster.find_leader("events", 0).unwrap();
        assert_ne!(old, new);
        assert_eq!(
            cluster.produce(old, "events", 0, "late"),
            Err(SendError::BrokerDown(old))
        );
        assert!(!cluster.running_brokers().contains(&old));
    }

    #[test]
    fn test_stale_leader_is_rejected() {
        let cluster = running_cluster(2);
        cluster.create_topic("events", 2, 1).unwrap();
        let follower = cluster.find_leader("events", 1).unwrap();

        assert!(matches!(
            cluster.produce(follower, "events", 0, "x"),
            Err(SendError::NotLeaderForPartition { .. })
        ));
    }

    #[test]
    fn test_admin_errors() {
        let cluster = running_cluster(2);
        assert_eq!(cluster.create_topic("t", 0, 1), Err(AdminError::NoPartitions));
        assert!(matches!(
            cluster.create_topic("t", 1, 3),
            Err(AdminError::InvalidReplication { requested: 3, brokers: 2 })
        ));
        cluster.create_topic("t", 1, 1).unwrap();
        assert_eq!(
            cluster.create_topic("t", 1, 1),
            Err(AdminError::TopicExists("t".to_string()))
        );
        assert_eq!(cluster.stop_broker(9), Err(AdminError::UnknownBroker(9)));
    }

    #[test]
    fn test_classification() {
        assert!(SendError::BrokerNotAvailable.is_transient());
        assert!(SendError::UnknownTopic("t".into()).is_transient());
        assert!(
            !SendError::InvalidPartition {
                topic: "t".into(),
                partition: 99,
                partitions: 1
            }
            .is_transient()
        );
        assert!(!SendError::MessageTooLarge { size: 2, max: 1 }.is_transient());
    }
}
