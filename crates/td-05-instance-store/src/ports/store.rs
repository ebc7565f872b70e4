//! Instance store port.

use crate::domain::{InstanceState, InstanceStoreResult, ProcessInstance};
use shared_types::{InstanceId, Timestamp};
use std::sync::Arc;
use td_01_transaction::TransactionContext;

/// Observer of committed instance lifecycle changes.
pub trait InstanceListener: Send + Sync {
    /// An instance reached a finished state.
    fn on_finished(&self, _id: &InstanceId, _state: InstanceState) {}

    /// An instance was deleted.
    fn on_removed(&self, _id: &InstanceId) {}
}

/// Storage of process instances.
///
/// Writes take the transaction they belong to. They are visible through
/// [`ProcessInstanceStore::get_in`] for that transaction right away and
/// through [`ProcessInstanceStore::get`] once it commits. A rollback
/// discards them.
pub trait ProcessInstanceStore: Send + Sync {
    fn create(&self, tx: &TransactionContext, instance: ProcessInstance)
        -> InstanceStoreResult<()>;

    /// Committed view.
    fn get(&self, id: &InstanceId) -> Option<ProcessInstance>;

    /// View including the uncommitted writes of `tx`.
    fn get_in(&self, tx: &TransactionContext, id: &InstanceId) -> Option<ProcessInstance>;

    /// Changes the state of an instance. Returns the previous state.
    fn set_state(
        &self,
        tx: &TransactionContext,
        id: &InstanceId,
        state: InstanceState,
        now: Timestamp,
    ) -> InstanceStoreResult<InstanceState>;

    fn set_correlation_key(
        &self,
        tx: &TransactionContext,
        id: &InstanceId,
        set: &str,
        value: &str,
    ) -> InstanceStoreResult<()>;

    /// Committed instances whose correlation set `set` has key `value`.
    fn find_by_correlation(&self, set: &str, value: &str) -> Vec<InstanceId>;

    fn delete(&self, tx: &TransactionContext, id: &InstanceId) -> InstanceStoreResult<()>;

    fn list_by_state(&self, state: InstanceState) -> Vec<ProcessInstance>;

    fn add_listener(&self, listener: Arc<dyn InstanceListener>);
}
