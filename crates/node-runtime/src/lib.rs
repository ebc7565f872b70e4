//! # Node Runtime Library
//!
//! This library exposes the internal modules of the node runtime for testing.
//! The main entry point is the `main.rs` binary.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: subsystems define ports, the node plugs in
//!   adapters
//! - **Explicit Transactions**: every unit of work is a `TransactionContext`
//!   passed to the code that takes part in it
//! - **Coordinator Duties**: cluster-wide chores run on the lease holder only

#![allow(clippy::type_complexity)]

pub mod container;
pub mod handlers;
pub mod wiring;

pub use container::{ClusterBackends, ConfigError, NodeConfig, SubsystemContainer};
