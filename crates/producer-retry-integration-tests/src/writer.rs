//! A producer for one topic partition, driven by the retry engine.

use std::fmt;
use std::sync::Arc;

use producer_retry::RetryError;
use producer_retry::retry::{RetryExecutor, RetryObserver, RetryPolicy, RetryableOperation};

use crate::cluster::{BrokerId, Cluster, SendError};

/// Called at the start of every attempt with the cluster and the number of
/// messages acknowledged so far.
pub type FaultHook = Box<dyn FnMut(&Cluster, u64) + Send>;

/// Writes messages to one partition, caching the partition leader between
/// attempts the way a real producer caches metadata.
pub struct Writer {
    cluster: Arc<Cluster>,
    topic: String,
    partition: u32,
    leader: Option<BrokerId>,
    message: String,
    acked: u64,
    metadata_refreshes: u32,
    fault: Option<FaultHook>,
}

impl Writer {
    /// A writer for `topic`, partition `partition`.
    pub fn new(cluster: Arc<Cluster>, topic: impl Into<String>, partition: u32) -> Self {
        Self {
            cluster,
            topic: topic.into(),
            partition,
            leader: None,
            message: String::new(),
            acked: 0,
            metadata_refreshes: 0,
            fault: None,
        }
    }

    /// Inject faults from inside every attempt.
    pub fn with_fault(mut self, hook: impl FnMut(&Cluster, u64) + Send + 'static) -> Self {
        self.fault = Some(Box::new(hook));
        self
    }

    /// Set the message the next attempt sends.
    pub fn prepare(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    /// Send `message` under `executor`'s policy, returning its offset.
    pub async fn write<P, O>(
        &mut self,
        executor: &RetryExecutor<P, O>,
        message: impl Into<String>,
    ) -> Result<u64, RetryError<SendError>>
    where
        P: RetryPolicy<SendError>,
        O: RetryObserver,
    {
        self.prepare(message);
        executor.run(self).await
    }

    /// Messages acknowledged by the cluster.
    pub fn acked(&self) -> u64 {
        self.acked
    }

    /// Times the cached leader was dropped after a failure.
    pub fn metadata_refreshes(&self) -> u32 {
        self.metadata_refreshes
    }

    /// Leader the writer currently sends to.
    pub fn cached_leader(&self) -> Option<BrokerId> {
        self.leader
    }
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("topic", &self.topic)
            .field("partition", &self.partition)
            .field("leader", &self.leader)
            .field("acked", &self.acked)
            .finish_non_exhaustive()
    }
}

impl RetryableOperation for Writer {
    type Output = u64;
    type Error = SendError;

    async fn perform(&mut self) -> Result<u64, SendError> {
        if let Some(fault) = self.fault.as_mut() {
            fault(&self.cluster, self.acked);
        }

        let leader = match self.leader {
            Some(leader) => leader,
            None => {
                let leader = self.cluster.find_leader(&self.topic, self.partition)?;
                self.leader = Some(leader);
                leader
            }
        };

        let offset = self
            .cluster
            .produce(leader, &self.topic, self.partition, &self.message)?;
        self.acked += 1;
        Ok(offset)
    }

    async fn before_retry(&mut self) -> Result<(), SendError> {
        self.leader = None;
        self.metadata_refreshes += 1;
        tracing::debug!(topic = %self.topic, partition = self.partition, "refreshing metadata");
        Ok(())
    }
}
