//! Adapters for the transaction subsystem.

pub mod in_memory;

pub use in_memory::InMemoryResourceManager;
