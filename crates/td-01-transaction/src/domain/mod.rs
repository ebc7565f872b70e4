//! Domain layer for the transaction subsystem.

pub mod context;
pub mod synchronizer;

pub use context::{TransactionContext, TxId, TxStatus};
pub use synchronizer::{HookResult, Synchronization, Synchronizer};
