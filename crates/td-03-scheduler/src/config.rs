//! Scheduler configuration.

use shared_types::NodeId;
use std::time::Duration;

/// Cluster membership settings.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// This node's identity.
    pub node_id: NodeId,
    /// A node silent for longer than this is considered dead.
    pub stale_interval: Duration,
    /// How often this node publishes its heartbeat and refreshes its lease.
    pub heartbeat_interval: Duration,
    /// Lifetime of the coordinator lease.
    pub lease_duration: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new("node-1"),
            stale_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(5),
            lease_duration: Duration::from_secs(15),
        }
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Size of the worker pool.
    pub worker_threads: usize,
    /// Jobs due within this window are queued in memory.
    pub immediate_interval: Duration,
    /// Jobs due within this window are owned by a node but stay in the store.
    pub near_future_interval: Duration,
    /// Expected job throughput per second; sizes load batches.
    pub transactions_per_second: u64,
    /// Upper bound for jobs held in the todo queue.
    pub todo_limit: usize,
    /// A job marked outstanding for longer than this may be queued again.
    pub outstanding_ttl: Duration,
    pub cluster: ClusterConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: 16,
            immediate_interval: Duration::from_secs(30),
            near_future_interval: Duration::from_secs(10 * 60),
            transactions_per_second: 100,
            todo_limit: 10_000,
            outstanding_ttl: Duration::from_secs(60 * 60),
            cluster: ClusterConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn node_id(&self) -> &NodeId {
        &self.cluster.node_id
    }

    /// Jobs loaded per load-immediate pass.
    pub fn immediate_batch_size(&self) -> usize {
        let batch = self.immediate_interval.as_millis() as u64 * self.transactions_per_second / 1000;
        batch.max(1) as usize
    }

    pub(crate) fn immediate_ms(&self) -> u64 {
        self.immediate_interval.as_millis() as u64
    }

    pub(crate) fn near_future_ms(&self) -> u64 {
        self.near_future_interval.as_millis() as u64
    }

    pub(crate) fn stale_ms(&self) -> u64 {
        self.cluster.stale_interval.as_millis() as u64
    }
}
