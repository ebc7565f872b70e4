//! The transaction context.
//!
//! Owns the synchronizer list, the rollback-only flag and the resource-side
//! transaction. Completion consumes the context; dropping one that was never
//! completed rolls it back.

use super::synchronizer::{run_guarded, HookResult, Synchronizer};
use crate::error::{TxError, TxResult};
use crate::ports::ResourceTransaction;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId(pub Uuid);

impl TxId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Transaction status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    MarkedRollback,
    Preparing,
    Committing,
    Committed,
    RolledBack,
}

impl TxStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    fn accepts_synchronizers(&self) -> bool {
        matches!(self, Self::Active | Self::MarkedRollback | Self::Preparing)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "ACTIVE",
            Self::MarkedRollback => "MARKED_ROLLBACK",
            Self::Preparing => "PREPARING",
            Self::Committing => "COMMITTING",
            Self::Committed => "COMMITTED",
            Self::RolledBack => "ROLLED_BACK",
        };
        f.write_str(name)
    }
}

/// Which thread owns which active transaction.
#[derive(Debug, Default)]
pub(crate) struct ThreadTable {
    active: Mutex<HashMap<ThreadId, TxId>>,
}

impl ThreadTable {
    pub(crate) fn claim(&self, thread: ThreadId, tx_id: TxId) -> TxResult<()> {
        let mut active = self.active.lock();
        if let Some(existing) = active.get(&thread) {
            return Err(TxError::IllegalState(format!(
                "transaction {existing} already active on this thread"
            )));
        }
        active.insert(thread, tx_id);
        Ok(())
    }

    pub(crate) fn release(&self, thread: ThreadId, tx_id: TxId) {
        let mut active = self.active.lock();
        if active.get(&thread) == Some(&tx_id) {
            active.remove(&thread);
        }
    }

    pub(crate) fn get(&self, thread: ThreadId) -> Option<TxId> {
        self.active.lock().get(&thread).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.active.lock().len()
    }
}

struct ContextState {
    status: TxStatus,
    /// Slots are emptied as one-shot hooks are consumed.
    hooks: Vec<Option<Synchronizer>>,
}

/// Handle over one unit of work.
pub struct TransactionContext {
    id: TxId,
    owner: ThreadId,
    timeout: Duration,
    started: Instant,
    rollback_only: AtomicBool,
    state: Mutex<ContextState>,
    resource: Mutex<Option<Box<dyn ResourceTransaction>>>,
    table: Arc<ThreadTable>,
}

impl TransactionContext {
    pub(crate) fn new(
        id: TxId,
        timeout: Duration,
        resource: Box<dyn ResourceTransaction>,
        table: Arc<ThreadTable>,
    ) -> Self {
        Self {
            id,
            owner: thread::current().id(),
            timeout,
            started: Instant::now(),
            rollback_only: AtomicBool::new(false),
            state: Mutex::new(ContextState {
                status: TxStatus::Active,
                hooks: Vec::new(),
            }),
            resource: Mutex::new(Some(resource)),
            table,
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn status(&self) -> TxStatus {
        self.state.lock().status
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    /// Marks the transaction so that it can only roll back. Cannot be undone.
    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.status == TxStatus::Active {
            state.status = TxStatus::MarkedRollback;
        }
    }

    /// Appends a hook. Hooks added while before hooks are running still run.
    pub fn register_synchronizer(&self, hook: Synchronizer) -> TxResult<()> {
        let mut state = self.state.lock();
        if !state.status.accepts_synchronizers() {
            return Err(TxError::IllegalState(format!(
                "cannot register synchronizer on transaction {} in state {}",
                self.id, state.status
            )));
        }
        state.hooks.push(Some(hook));
        Ok(())
    }

    pub fn synchronizer_count(&self) -> usize {
        self.state.lock().hooks.iter().flatten().count()
    }

    /// Commits the unit of work.
    ///
    /// Runs every before hook, re-checks the rollback-only flag, then commits
    /// the resource transaction. Any path that ends in rollback runs the
    /// after hooks with `false` and returns an error.
    pub fn commit(self) -> TxResult<()> {
        self.complete_commit()
    }

    /// Rolls back the unit of work. Before hooks are never called.
    pub fn rollback(self) -> TxResult<()> {
        self.ensure_not_completed("rollback")?;
        self.complete_rollback("rollback requested")
    }

    fn complete_commit(&self) -> TxResult<()> {
        self.ensure_not_completed("commit")?;

        if self.is_rollback_only() {
            return self.degrade_to_rollback("marked rollback-only");
        }
        if self.elapsed() > self.timeout {
            return self.degrade_to_rollback("transaction timed out");
        }

        self.set_status(TxStatus::Preparing);
        self.run_before_phase();

        if self.is_rollback_only() {
            return self.degrade_to_rollback("marked rollback-only during before-completion");
        }

        self.set_status(TxStatus::Committing);
        let outcome = match self.resource.lock().take() {
            Some(mut resource) => match resource.commit() {
                Ok(()) => Ok(()),
                Err(e) => {
                    if let Err(rb) = resource.rollback() {
                        warn!(tx_id = %self.id, error = %rb, "Resource rollback after failed commit failed");
                    }
                    Err(e)
                }
            },
            None => Ok(()),
        };

        match outcome {
            Ok(()) => {
                self.finish(TxStatus::Committed);
                debug!(tx_id = %self.id, "Transaction committed");
                self.run_after_phase(true);
                Ok(())
            }
            Err(e) => {
                self.finish(TxStatus::RolledBack);
                warn!(tx_id = %self.id, error = %e, "Resource commit failed; transaction rolled back");
                self.run_after_phase(false);
                Err(TxError::CommitFailed {
                    tx_id: self.id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn degrade_to_rollback(&self, reason: &str) -> TxResult<()> {
        self.complete_rollback(reason)?;
        Err(TxError::RolledBack {
            tx_id: self.id.to_string(),
            reason: reason.to_string(),
        })
    }

    fn complete_rollback(&self, reason: &str) -> TxResult<()> {
        let result = match self.resource.lock().take() {
            Some(mut resource) => resource.rollback(),
            None => Ok(()),
        };
        self.finish(TxStatus::RolledBack);
        debug!(tx_id = %self.id, reason, "Transaction rolled back");
        self.run_after_phase(false);
        result.map_err(|e| TxError::RollbackFailed {
            tx_id: self.id.to_string(),
            reason: e.to_string(),
        })
    }

    fn ensure_not_completed(&self, action: &str) -> TxResult<()> {
        let status = self.status();
        if status.is_completed() {
            return Err(TxError::IllegalState(format!(
                "cannot {action} transaction {} in state {status}",
                self.id
            )));
        }
        Ok(())
    }

    fn set_status(&self, status: TxStatus) {
        self.state.lock().status = status;
    }

    fn finish(&self, status: TxStatus) {
        self.set_status(status);
        self.table.release(self.owner, self.id);
    }

    fn run_before_phase(&self) {
        let tx_id = self.id.to_string();
        let mut index = 0;
        loop {
            let hook: Option<Box<dyn FnOnce() -> HookResult + Send>> = {
                let mut state = self.state.lock();
                let Some(slot) = state.hooks.get_mut(index) else {
                    break;
                };
                index += 1;
                match slot {
                    Some(Synchronizer::Pair(listener)) => {
                        let listener = Arc::clone(listener);
                        Some(Box::new(move || listener.before_completion())
                            as Box<dyn FnOnce() -> HookResult + Send>)
                    }
                    Some(Synchronizer::Before(_)) => match slot.take() {
                        Some(Synchronizer::Before(f)) => Some(f),
                        _ => None,
                    },
                    _ => None,
                }
            };
            if let Some(hook) = hook {
                run_guarded(&tx_id, "before_completion", hook);
            }
        }
    }

    fn run_after_phase(&self, committed: bool) {
        let tx_id = self.id.to_string();
        let hooks = std::mem::take(&mut self.state.lock().hooks);
        for hook in hooks.into_iter().flatten() {
            match hook {
                Synchronizer::After(f) => {
                    run_guarded(&tx_id, "after_completion", || f(committed));
                }
                Synchronizer::Pair(listener) => {
                    run_guarded(&tx_id, "after_completion", || {
                        listener.after_completion(committed)
                    });
                }
                Synchronizer::Before(_) => {}
            }
        }
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("rollback_only", &self.is_rollback_only())
            .finish()
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if self.status().is_completed() {
            return;
        }
        warn!(tx_id = %self.id, "Transaction dropped without completion; rolling back");
        if let Err(e) = self.complete_rollback("dropped") {
            warn!(tx_id = %self.id, error = %e, "Rollback of dropped transaction failed");
        }
    }
}
