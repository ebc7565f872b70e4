//! The job store port.
//!
//! Implemented by the durable store. Calls are synchronous; the scheduler
//! invokes them from worker threads inside transactions.

use crate::domain::{JobOutcome, JobRecord, JobStoreResult, JobStoreStats};
use shared_types::{JobId, NodeId, Timestamp};

/// Durable job storage.
pub trait JobStore: Send + Sync {
    /// Writes a job in the `Staged` state.
    ///
    /// # Errors
    /// - `DuplicateJob` if the id is taken
    /// - `Unavailable` if the store cannot be reached
    fn stage(&self, job: JobRecord) -> JobStoreResult<()>;

    /// Makes a staged job visible (`Staged → Pending`). Called on commit.
    fn publish(&self, job_id: &JobId) -> JobStoreResult<()>;

    /// Deletes a staged job. Called on rollback.
    fn discard(&self, job_id: &JobId) -> JobStoreResult<()>;

    /// Atomically moves a pending job to `Claimed(node)`.
    ///
    /// A job owned by another node cannot be claimed.
    ///
    /// # Errors
    /// - `JobNoLongerInDb` if the job is absent, staged or already claimed
    fn claim(&self, job_id: &JobId, node: &NodeId) -> JobStoreResult<JobRecord>;

    /// Deletes a job claimed by `node`, recording how it ended.
    ///
    /// # Errors
    /// - `JobNoLongerInDb` if the job is gone or no longer claimed by `node`
    ///   (its claim was reset by stale-node recovery, and possibly re-claimed)
    fn finish(&self, job_id: &JobId, node: &NodeId, outcome: JobOutcome) -> JobStoreResult<()>;

    /// Deletes a pending job. Returns `false` if it is claimed or gone.
    fn cancel(&self, job_id: &JobId) -> JobStoreResult<bool>;

    fn get(&self, job_id: &JobId) -> JobStoreResult<Option<JobRecord>>;

    /// Pending jobs owned by `node` due at or before `max_due`, earliest
    /// first, at most `limit`.
    fn dequeue_immediate(
        &self,
        node: &NodeId,
        max_due: Timestamp,
        limit: usize,
    ) -> JobStoreResult<Vec<JobRecord>>;

    /// Assigns unowned pending jobs due at or before `max_due` to `nodes`
    /// by `due_at mod nodes.len()`. Returns how many were assigned.
    fn upgrade_jobs(&self, max_due: Timestamp, nodes: &[NodeId]) -> JobStoreResult<usize>;

    /// Moves every job owned by `from` to `to`. Jobs claimed by `from` go
    /// back to pending. Returns how many were moved.
    fn reassign_jobs(&self, from: &NodeId, to: &NodeId) -> JobStoreResult<usize>;

    /// Distinct owners of stored jobs.
    fn node_ids(&self) -> JobStoreResult<Vec<NodeId>>;

    fn stats(&self) -> JobStoreResult<JobStoreStats>;
}
