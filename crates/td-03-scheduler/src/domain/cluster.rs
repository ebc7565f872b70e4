//! Heartbeat view of the cluster.
//!
//! One view may be shared by every scheduler in a process (tests, embedded
//! clusters); across processes the view is fed by whatever transport
//! carries heartbeats.

use parking_lot::RwLock;
use shared_types::{NodeId, Timestamp};
use std::collections::HashMap;

/// Last heartbeat per node.
#[derive(Debug, Default)]
pub struct ClusterView {
    heartbeats: RwLock<HashMap<NodeId, Timestamp>>,
}

impl ClusterView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a heartbeat. Older timestamps never overwrite newer ones.
    pub fn heartbeat(&self, node: &NodeId, at: Timestamp) {
        let mut heartbeats = self.heartbeats.write();
        let last = heartbeats.entry(node.clone()).or_insert(at);
        if at > *last {
            *last = at;
        }
    }

    /// Starts tracking nodes learned from elsewhere (e.g. job owners in the
    /// store). A node never heard from counts as last seen at `now`.
    pub fn observe<'a>(&self, nodes: impl IntoIterator<Item = &'a NodeId>, now: Timestamp) {
        let mut heartbeats = self.heartbeats.write();
        for node in nodes {
            heartbeats.entry(node.clone()).or_insert(now);
        }
    }

    pub fn last_heartbeat(&self, node: &NodeId) -> Option<Timestamp> {
        self.heartbeats.read().get(node).copied()
    }

    /// Known nodes, sorted.
    pub fn known_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.heartbeats.read().keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Nodes other than `me` silent for longer than `stale_ms`, sorted.
    pub fn stale_nodes(&self, now: Timestamp, stale_ms: u64, me: &NodeId) -> Vec<NodeId> {
        let mut stale: Vec<NodeId> = self
            .heartbeats
            .read()
            .iter()
            .filter(|(node, last)| *node != me && now.saturating_sub(**last) > stale_ms)
            .map(|(node, _)| node.clone())
            .collect();
        stale.sort();
        stale
    }

    /// Stops tracking a node after its jobs were recovered.
    pub fn forget(&self, node: &NodeId) {
        self.heartbeats.write().remove(node);
    }

    pub fn len(&self) -> usize {
        self.heartbeats.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
