//! Ports layer for the instance store.

pub mod store;

pub use store::{InstanceListener, ProcessInstanceStore};
