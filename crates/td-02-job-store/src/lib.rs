//! # Job Store Subsystem
//!
//! Durable storage for scheduled jobs and the single linearization point
//! between cluster nodes.
//!
//! ## Job Lifecycle
//!
//! ```text
//! stage() ──→ [STAGED] ──publish (commit)──→ [PENDING] ──claim──→ [CLAIMED{node}]
//!                │                              │                     │
//!          discard (rollback)             cancel()              finish(outcome)
//!                │                              │                     │
//!                ▼                              ▼                     ▼
//!            (deleted)                      (deleted)        (deleted: DONE | FAILED_DROPPED)
//! ```
//!
//! Staged jobs are invisible to every query. A claim is a conditional update
//! under the store's lock: exactly one of any number of concurrent claimers
//! wins, the others get [`JobStoreError::JobNoLongerInDb`].
//!
//! ## Ownership
//!
//! | Horizon | `node_owner` at schedule time | Picked up by |
//! |---------|-------------------------------|--------------|
//! | immediate | scheduling node | todo queue after commit |
//! | near future | scheduling node | load-immediate task |
//! | far future | none | upgrade task assigns an owner |
//!
//! Jobs of a stale node are moved to the recovering node with
//! [`JobStore::reassign_jobs`]; claimed jobs of that node go back to pending.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::InMemoryJobStore;
pub use domain::{
    JobOutcome, JobRecord, JobState, JobStoreError, JobStoreResult, JobStoreStats,
};
pub use ports::JobStore;
