//! Lease-based coordinator election.
//!
//! A node is coordinator while it holds an unexpired lease on
//! [`COORDINATOR_LEASE_KEY`]. The holder renews on every heartbeat; if it
//! dies, the lease expires and the next node to refresh takes over.
//!
//! A holder stops calling itself coordinator a safety margin before its
//! lease expires, so a late refresh never overlaps another node's term:
//!
//! ```text
//! a.refresh()                 a stops         lease expires   b.refresh()
//!     │────── coordinator ──────│── margin ──────│──────────────│── b coordinator ──→
//! ```

use crate::error::LeaseError;
use crate::ports::{CoordinatorElection, LeaseTable};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{NodeId, TimeSource, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Lease key contended for by schedulers.
pub const COORDINATOR_LEASE_KEY: &str = "scheduler-coordinator";

#[derive(Debug, Clone)]
struct Lease {
    holder: NodeId,
    expires_at: Timestamp,
}

/// Lease table shared in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLeaseTable {
    leases: Mutex<HashMap<String, Lease>>,
}

impl InMemoryLeaseTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseTable for InMemoryLeaseTable {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &NodeId,
        ttl: Duration,
        now: Timestamp,
    ) -> Result<bool, LeaseError> {
        let mut leases = self.leases.lock();
        let expires_at = now + ttl.as_millis() as u64;
        match leases.get_mut(key) {
            Some(lease) if lease.holder != *holder && lease.expires_at > now => Ok(false),
            Some(lease) => {
                lease.holder = holder.clone();
                lease.expires_at = expires_at;
                Ok(true)
            }
            None => {
                leases.insert(
                    key.to_string(),
                    Lease {
                        holder: holder.clone(),
                        expires_at,
                    },
                );
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, holder: &NodeId) -> Result<(), LeaseError> {
        let mut leases = self.leases.lock();
        if leases.get(key).is_some_and(|lease| lease.holder == *holder) {
            leases.remove(key);
        }
        Ok(())
    }

    async fn holder(&self, key: &str, now: Timestamp) -> Result<Option<NodeId>, LeaseError> {
        Ok(self
            .leases
            .lock()
            .get(key)
            .filter(|lease| lease.expires_at > now)
            .map(|lease| lease.holder.clone()))
    }
}

/// Coordinator elected through a [`LeaseTable`].
pub struct LeaseCoordinator {
    node_id: NodeId,
    table: Arc<dyn LeaseTable>,
    time: Arc<dyn TimeSource>,
    lease_duration: Duration,
    leader: AtomicBool,
    /// Local deadline of the current term; zero when not holding the lease.
    term_ends_at: AtomicU64,
}

impl LeaseCoordinator {
    pub fn new(
        node_id: NodeId,
        table: Arc<dyn LeaseTable>,
        time: Arc<dyn TimeSource>,
        lease_duration: Duration,
    ) -> Self {
        Self {
            node_id,
            table,
            time,
            lease_duration,
            leader: AtomicBool::new(false),
            term_ends_at: AtomicU64::new(0),
        }
    }

    /// Time before lease expiry at which this node gives up the role.
    fn safety_margin_ms(&self) -> u64 {
        (self.lease_duration.as_millis() as u64 / 10).max(1)
    }

    fn set_leader(&self, leader: bool) {
        if !leader {
            self.term_ends_at.store(0, Ordering::SeqCst);
        }
        let was = self.leader.swap(leader, Ordering::SeqCst);
        if was != leader {
            info!(node = %self.node_id, coordinator = leader, "Coordinator role changed");
        }
    }
}

#[async_trait]
impl CoordinatorElection for LeaseCoordinator {
    fn is_coordinator(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
            && self.time.now() < self.term_ends_at.load(Ordering::SeqCst)
    }

    async fn refresh(&self) -> Result<bool, LeaseError> {
        let requested_at = self.time.now();
        let acquired = self
            .table
            .try_acquire(
                COORDINATOR_LEASE_KEY,
                &self.node_id,
                self.lease_duration,
                requested_at,
            )
            .await;
        match acquired {
            Ok(leader) => {
                if leader {
                    let term = (self.lease_duration.as_millis() as u64)
                        .saturating_sub(self.safety_margin_ms());
                    self.term_ends_at
                        .store(requested_at + term, Ordering::SeqCst);
                }
                self.set_leader(leader);
                Ok(leader)
            }
            Err(e) => {
                // Without a renewed lease this node cannot assume it still leads.
                self.set_leader(false);
                Err(e)
            }
        }
    }

    async fn resign(&self) -> Result<(), LeaseError> {
        self.set_leader(false);
        self.table
            .release(COORDINATOR_LEASE_KEY, &self.node_id)
            .await
    }
}

/// Fixed role, for single-node deployments.
#[derive(Debug, Clone, Copy)]
pub struct StaticCoordinator {
    coordinator: bool,
}

impl StaticCoordinator {
    pub fn new(coordinator: bool) -> Self {
        Self { coordinator }
    }

    pub fn leader() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl CoordinatorElection for StaticCoordinator {
    fn is_coordinator(&self) -> bool {
        self.coordinator
    }

    async fn refresh(&self) -> Result<bool, LeaseError> {
        Ok(self.coordinator)
    }

    async fn resign(&self) -> Result<(), LeaseError> {
        Ok(())
    }
}
