//! Ports layer for the job store.

pub mod store;

pub use store::JobStore;
