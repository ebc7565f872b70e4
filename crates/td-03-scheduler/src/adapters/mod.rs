//! Adapters for the scheduler ports.

pub mod dispatcher;
pub mod lease;

pub use dispatcher::JobDispatcher;
pub use lease::{InMemoryLeaseTable, LeaseCoordinator, StaticCoordinator, COORDINATOR_LEASE_KEY};
