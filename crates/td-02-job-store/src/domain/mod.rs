//! Domain layer for the job store.

pub mod errors;
pub mod job;

pub use errors::*;
pub use job::*;
