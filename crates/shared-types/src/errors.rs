//! # Error Types
//!
//! Errors raised by the shared registries.

use thiserror::Error;

/// Errors from the operation catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The operation was already registered with a different pattern.
    #[error("Operation {service}#{operation} already registered as {existing}")]
    ConflictingOperation {
        service: String,
        operation: String,
        existing: String,
    },
}
