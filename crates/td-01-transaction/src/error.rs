//! Error types for the transaction subsystem.

use thiserror::Error;

/// Transaction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// Operation not permitted in the current transaction state.
    #[error("Illegal transaction state: {0}")]
    IllegalState(String),

    /// The transaction was rolled back instead of committed.
    #[error("Transaction {tx_id} rolled back: {reason}")]
    RolledBack { tx_id: String, reason: String },

    /// The resource commit failed; the transaction is rolled back.
    #[error("Transaction {tx_id} commit failed: {reason}")]
    CommitFailed { tx_id: String, reason: String },

    /// The resource rollback failed.
    #[error("Transaction {tx_id} rollback failed: {reason}")]
    RollbackFailed { tx_id: String, reason: String },

    /// The resource manager refused to start a transaction.
    #[error("Resource manager unavailable: {0}")]
    ResourceUnavailable(String),
}

impl TxError {
    /// True when the error means "the work did not commit".
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::RolledBack { .. } | Self::CommitFailed { .. })
    }
}

/// Result type for transaction operations.
pub type TxResult<T> = Result<T, TxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TxError::RolledBack {
            tx_id: "tx-1".into(),
            reason: "marked rollback-only".into(),
        };
        assert_eq!(
            err.to_string(),
            "Transaction tx-1 rolled back: marked rollback-only"
        );
        assert!(err.is_rollback());
        assert!(!TxError::IllegalState("x".into()).is_rollback());
    }
}
