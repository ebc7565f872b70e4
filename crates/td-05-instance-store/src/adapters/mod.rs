//! Adapters for the instance store.

pub mod memory;

pub use memory::InMemoryInstanceStore;
