//! Error types for the exchange registry.

use crate::domain::ExchangeStatus;
use shared_types::{ExchangeId, InstanceId};
use td_01_transaction::TxError;
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Message exchange {0} already exists")]
    DuplicateExchange(ExchangeId),

    #[error("Message exchange {0} not found")]
    NotFound(ExchangeId),

    /// The exchange was evicted, released or rolled back.
    #[error("Message exchange {0} is no longer registered")]
    Detached(ExchangeId),

    #[error("{0} is not a terminal status")]
    NotTerminal(ExchangeStatus),

    /// Status updates may only move forward.
    #[error("Message exchange {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: ExchangeId,
        from: ExchangeStatus,
        to: ExchangeStatus,
    },

    /// Another instance already listens on this resource.
    #[error("Resource route {url}~{method} already held by instance {holder}")]
    RouteConflict {
        url: String,
        method: String,
        holder: InstanceId,
    },

    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
