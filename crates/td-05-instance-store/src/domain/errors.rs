//! Instance store errors.

use crate::domain::InstanceState;
use shared_types::InstanceId;
use td_01_transaction::TxError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceStoreError {
    #[error("Process instance {0} not found")]
    NotFound(InstanceId),

    #[error("Process instance {0} already exists")]
    DuplicateInstance(InstanceId),

    /// Finished instances never change state again.
    #[error("Process instance {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: InstanceId,
        from: InstanceState,
        to: InstanceState,
    },

    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),
}

pub type InstanceStoreResult<T> = Result<T, InstanceStoreError>;
