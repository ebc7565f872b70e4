//! # Scheduler Subsystem
//!
//! Delivers every job to exactly one node, exactly once, under
//! transactional semantics.
//!
//! ## Flow
//!
//! ```text
//! caller tx ──schedule_*()──→ staged job / commit hook
//!                                     │ commit
//!                                     ▼
//!                    ┌──────── todo queue (this node) ◄── LoadImmediate
//!                    │                                        ▲
//!                    ▼                                        │
//!             worker pool ──claim──→ JobStore            UpgradeJobs
//!                    │                   ▲               (coordinator)
//!                    ▼                   │
//!             JobProcessor ──commit──→ delete job
//! ```
//!
//! ## Guarantees
//!
//! - A job scheduled in a transaction that rolls back never runs.
//! - The store's claim decides which node runs a persisted job; losers roll
//!   back quietly.
//! - A failed job is dropped and logged, never retried.
//!
//! ## Module Structure
//!
//! ```text
//! domain/     - TodoQueue, ClusterView
//! ports/      - JobProcessor, JobHandler, CoordinatorElection, LeaseTable
//! adapters/   - JobDispatcher, lease coordinator, static coordinator
//! service.rs  - SimpleScheduler
//! isolated.rs - IsolatedTransaction handle
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod isolated;
pub mod ports;
pub mod service;

pub use adapters::{
    InMemoryLeaseTable, JobDispatcher, LeaseCoordinator, StaticCoordinator, COORDINATOR_LEASE_KEY,
};
pub use config::{ClusterConfig, SchedulerConfig};
pub use domain::ClusterView;
pub use error::{BoxError, JobProcessorError, LeaseError, SchedulerError, SchedulerResult};
pub use isolated::IsolatedTransaction;
pub use ports::{CoordinatorElection, JobHandler, JobInfo, JobProcessor, LeaseTable};
pub use service::{SchedulerDeps, SchedulerState, SchedulerStats, SimpleScheduler};
