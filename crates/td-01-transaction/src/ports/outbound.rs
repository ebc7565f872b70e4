//! Outbound (Driven) ports for the transaction subsystem.
//!
//! The scheduler is a thin client over this SPI; it does not implement
//! two-phase commit itself.

use crate::domain::TxId;
use crate::error::TxResult;
use std::time::Duration;

/// Starts resource transactions on the underlying durable store.
pub trait ResourceManager: Send + Sync {
    /// Begins a resource transaction bounded by `timeout`.
    ///
    /// The timeout bounds the commit on the resource side; it never
    /// interrupts the work done inside the transaction.
    fn begin(&self, tx_id: &TxId, timeout: Duration) -> TxResult<Box<dyn ResourceTransaction>>;
}

/// One resource-side transaction.
pub trait ResourceTransaction: Send {
    /// Makes the work durable.
    fn commit(&mut self) -> TxResult<()>;

    /// Discards the work.
    fn rollback(&mut self) -> TxResult<()>;
}
