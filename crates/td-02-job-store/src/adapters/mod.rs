//! Adapters for the job store.

pub mod memory;

pub use memory::InMemoryJobStore;
