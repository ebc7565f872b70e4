//! # Subsystem Container
//!
//! Central container holding all subsystem instances of a node with their
//! configuration.

pub mod config;
pub mod subsystems;

pub use config::{ConfigError, NodeConfig};
pub use subsystems::{ClusterBackends, SubsystemContainer};
