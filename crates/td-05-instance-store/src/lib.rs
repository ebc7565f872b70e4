//! # Process Instance Store
//!
//! The slice of process-instance state the scheduler's job handlers touch:
//! lifecycle state, correlation keys and the last-activity timestamp.
//!
//! Every write belongs to a transaction:
//!
//! ```text
//! create / set_state / delete (tx) ──→ [staged under tx]
//!                                          │
//!                          commit ─────────┼───────── rollback
//!                            │                           │
//!                            ▼                           ▼
//!                 applied, listeners notified       discarded
//! ```
//!
//! Listeners are how the node drops resource routes and message exchanges
//! of instances that finished or were deleted.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::InMemoryInstanceStore;
pub use domain::{InstanceState, InstanceStoreError, InstanceStoreResult, ProcessInstance};
pub use ports::{InstanceListener, ProcessInstanceStore};
