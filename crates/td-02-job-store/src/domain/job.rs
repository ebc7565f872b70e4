//! Job records and their lifecycle.

use super::errors::{JobStoreError, JobStoreResult};
use serde::{Deserialize, Serialize};
use shared_types::{JobDetails, JobId, NodeId, Timestamp};
use std::fmt;

/// Lifecycle state of a stored job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JobState {
    /// Written inside a transaction that has not committed yet.
    #[default]
    Staged,
    /// Visible and runnable.
    Pending,
    /// Held by a node that is executing it.
    Claimed(NodeId),
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Staged => f.write_str("STAGED"),
            Self::Pending => f.write_str("PENDING"),
            Self::Claimed(node) => write!(f, "CLAIMED({node})"),
        }
    }
}

/// How a claimed job ended. Either way the record is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    FailedDropped,
}

/// Persisted job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub details: JobDetails,
    /// Absent means "as soon as the scheduling transaction commits".
    pub due_at: Option<Timestamp>,
    pub node_owner: Option<NodeId>,
    pub transacted: bool,
    #[serde(default)]
    pub state: JobState,
}

impl JobRecord {
    pub fn new(id: JobId, details: JobDetails) -> Self {
        Self {
            id,
            details,
            due_at: None,
            node_owner: None,
            transacted: true,
            state: JobState::Staged,
        }
    }

    #[must_use]
    pub fn due_at(mut self, due_at: Option<Timestamp>) -> Self {
        self.due_at = due_at;
        self
    }

    #[must_use]
    pub fn owned_by(mut self, node: Option<NodeId>) -> Self {
        self.node_owner = node;
        self
    }

    #[must_use]
    pub fn transacted(mut self, transacted: bool) -> Self {
        self.transacted = transacted;
        self
    }

    pub fn job_type(&self) -> &str {
        &self.details.job_type
    }

    /// Due time used for ordering; undated jobs sort first.
    pub fn effective_due(&self) -> Timestamp {
        self.due_at.unwrap_or(0)
    }

    pub fn is_pending(&self) -> bool {
        self.state == JobState::Pending
    }

    pub fn to_json(&self) -> JobStoreResult<String> {
        serde_json::to_string(self).map_err(|e| JobStoreError::Encoding(e.to_string()))
    }

    pub fn from_json(json: &str) -> JobStoreResult<Self> {
        serde_json::from_str(json).map_err(|e| JobStoreError::Encoding(e.to_string()))
    }
}

/// Snapshot of store contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStoreStats {
    pub staged: usize,
    pub pending: usize,
    pub claimed: usize,
    pub done: u64,
    pub dropped: u64,
}
