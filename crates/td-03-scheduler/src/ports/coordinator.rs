//! Coordinator election ports.
//!
//! Exactly one node of a cluster runs the cluster-wide housekeeping (job
//! upgrade, stale-node recovery, exchange sweeping). Election is a lease
//! held in a table every node can reach.

use crate::error::LeaseError;
use async_trait::async_trait;
use shared_types::{NodeId, Timestamp};
use std::time::Duration;

/// Decides whether this node is the coordinator.
#[async_trait]
pub trait CoordinatorElection: Send + Sync {
    /// Last known role. Never blocks.
    fn is_coordinator(&self) -> bool;

    /// Re-runs the election and returns the new role.
    async fn refresh(&self) -> Result<bool, LeaseError>;

    /// Gives up the role, if held.
    async fn resign(&self) -> Result<(), LeaseError>;
}

/// Shared table of expiring leases.
#[async_trait]
pub trait LeaseTable: Send + Sync {
    /// Acquires `key` for `holder`, or renews it if `holder` already has it.
    /// Returns `false` while another holder's lease is unexpired.
    async fn try_acquire(
        &self,
        key: &str,
        holder: &NodeId,
        ttl: Duration,
        now: Timestamp,
    ) -> Result<bool, LeaseError>;

    /// Releases `key` if `holder` owns it.
    async fn release(&self, key: &str, holder: &NodeId) -> Result<(), LeaseError>;

    /// Current unexpired holder of `key`.
    async fn holder(&self, key: &str, now: Timestamp) -> Result<Option<NodeId>, LeaseError>;
}
