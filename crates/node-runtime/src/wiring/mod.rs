//! # Subsystem Wiring
//!
//! Glue between the subsystems that the subsystems themselves know nothing
//! about.
//!
//! ```text
//!  InstanceStore ──finished / removed──→ InstanceCleanup ──→ ExchangeRegistry
//!                                                            (routes, exchanges)
//!
//!  CoordinatorElection ──is_coordinator?──→ sweeper ──sweep(now)──→ ExchangeRegistry
//! ```

pub mod instance_cleanup;
pub mod sweeper;

pub use instance_cleanup::InstanceCleanup;
pub use sweeper::spawn_sweeper;
