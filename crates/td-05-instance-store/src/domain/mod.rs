//! Domain layer for the instance store.

pub mod errors;
pub mod instance;

pub use errors::*;
pub use instance::*;
