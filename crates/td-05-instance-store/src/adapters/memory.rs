//! In-memory instance store.
//!
//! Writes are buffered per transaction and applied to the committed map by
//! an after-completion hook. Listeners hear about committed changes only.

use crate::domain::{InstanceState, InstanceStoreError, InstanceStoreResult, ProcessInstance};
use crate::ports::{InstanceListener, ProcessInstanceStore};
use parking_lot::{Mutex, RwLock};
use shared_types::{InstanceId, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;
use td_01_transaction::{Synchronizer, TransactionContext, TxId};
use tracing::{debug, info};

enum Write {
    Put(ProcessInstance),
    Delete(InstanceId),
}

enum Event {
    Finished(InstanceId, InstanceState),
    Removed(InstanceId),
}

#[derive(Default)]
struct Inner {
    committed: RwLock<HashMap<InstanceId, ProcessInstance>>,
    staged: Mutex<HashMap<TxId, Vec<Write>>>,
    listeners: RwLock<Vec<Arc<dyn InstanceListener>>>,
}

impl Inner {
    fn view(&self, tx_id: &TxId, id: &InstanceId) -> Option<ProcessInstance> {
        {
            let staged = self.staged.lock();
            if let Some(writes) = staged.get(tx_id) {
                for write in writes.iter().rev() {
                    match write {
                        Write::Put(instance) if &instance.id == id => {
                            return Some(instance.clone())
                        }
                        Write::Delete(deleted) if deleted == id => return None,
                        _ => {}
                    }
                }
            }
        }
        self.committed.read().get(id).cloned()
    }

    fn complete(&self, tx_id: &TxId, committed: bool) {
        let writes = self.staged.lock().remove(tx_id).unwrap_or_default();
        if !committed {
            debug!(tx = %tx_id, discarded = writes.len(), "Instance writes discarded");
            return;
        }

        let mut events = Vec::new();
        {
            let mut map = self.committed.write();
            for write in writes {
                match write {
                    Write::Put(instance) => {
                        let was_finished = map
                            .get(&instance.id)
                            .is_some_and(|previous| previous.state.is_finished());
                        if instance.state.is_finished() && !was_finished {
                            events.push(Event::Finished(instance.id.clone(), instance.state));
                        }
                        map.insert(instance.id.clone(), instance);
                    }
                    Write::Delete(id) => {
                        if map.remove(&id).is_some() {
                            events.push(Event::Removed(id));
                        }
                    }
                }
            }
        }

        let listeners = self.listeners.read().clone();
        for event in events {
            match event {
                Event::Finished(id, state) => {
                    info!(instance = %id, %state, "Process instance finished");
                    listeners.iter().for_each(|l| l.on_finished(&id, state));
                }
                Event::Removed(id) => {
                    info!(instance = %id, "Process instance removed");
                    listeners.iter().for_each(|l| l.on_removed(&id));
                }
            }
        }
    }
}

/// Instance store held in process memory.
#[derive(Default)]
pub struct InMemoryInstanceStore {
    inner: Arc<Inner>,
}

impl InMemoryInstanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed instances.
    pub fn len(&self) -> usize {
        self.inner.committed.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transactions holding uncommitted writes.
    pub fn open_transactions(&self) -> usize {
        self.inner.staged.lock().len()
    }

    fn stage(&self, tx: &TransactionContext, write: Write) -> InstanceStoreResult<()> {
        let tx_id = tx.id();
        let first = {
            let mut staged = self.inner.staged.lock();
            let first = !staged.contains_key(&tx_id);
            staged.entry(tx_id).or_default().push(write);
            first
        };
        if first {
            let inner = Arc::clone(&self.inner);
            let hook = Synchronizer::after(move |committed| {
                inner.complete(&tx_id, committed);
                Ok(())
            });
            if let Err(e) = tx.register_synchronizer(hook) {
                self.inner.staged.lock().remove(&tx_id);
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn current(&self, tx: &TransactionContext, id: &InstanceId) -> InstanceStoreResult<ProcessInstance> {
        self.inner
            .view(&tx.id(), id)
            .ok_or_else(|| InstanceStoreError::NotFound(id.clone()))
    }
}

impl ProcessInstanceStore for InMemoryInstanceStore {
    fn create(
        &self,
        tx: &TransactionContext,
        instance: ProcessInstance,
    ) -> InstanceStoreResult<()> {
        if self.inner.view(&tx.id(), &instance.id).is_some() {
            return Err(InstanceStoreError::DuplicateInstance(instance.id));
        }
        debug!(instance = %instance.id, process = %instance.process, "Process instance created");
        self.stage(tx, Write::Put(instance))
    }

    fn get(&self, id: &InstanceId) -> Option<ProcessInstance> {
        self.inner.committed.read().get(id).cloned()
    }

    fn get_in(&self, tx: &TransactionContext, id: &InstanceId) -> Option<ProcessInstance> {
        self.inner.view(&tx.id(), id)
    }

    fn set_state(
        &self,
        tx: &TransactionContext,
        id: &InstanceId,
        state: InstanceState,
        now: Timestamp,
    ) -> InstanceStoreResult<InstanceState> {
        let mut instance = self.current(tx, id)?;
        let previous = instance.state;
        if previous.is_finished() && previous != state {
            return Err(InstanceStoreError::InvalidTransition {
                id: id.clone(),
                from: previous,
                to: state,
            });
        }
        instance.transition(state, now);
        self.stage(tx, Write::Put(instance))?;
        Ok(previous)
    }

    fn set_correlation_key(
        &self,
        tx: &TransactionContext,
        id: &InstanceId,
        set: &str,
        value: &str,
    ) -> InstanceStoreResult<()> {
        let mut instance = self.current(tx, id)?;
        instance
            .correlation_keys
            .insert(set.to_string(), value.to_string());
        self.stage(tx, Write::Put(instance))
    }

    fn find_by_correlation(&self, set: &str, value: &str) -> Vec<InstanceId> {
        let mut found: Vec<InstanceId> = self
            .inner
            .committed
            .read()
            .values()
            .filter(|instance| {
                instance.correlation_keys.get(set).map(String::as_str) == Some(value)
            })
            .map(|instance| instance.id.clone())
            .collect();
        found.sort();
        found
    }

    fn delete(&self, tx: &TransactionContext, id: &InstanceId) -> InstanceStoreResult<()> {
        self.current(tx, id)?;
        self.stage(tx, Write::Delete(id.clone()))
    }

    fn list_by_state(&self, state: InstanceState) -> Vec<ProcessInstance> {
        let mut found: Vec<ProcessInstance> = self
            .inner
            .committed
            .read()
            .values()
            .filter(|instance| instance.state == state)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }

    fn add_listener(&self, listener: Arc<dyn InstanceListener>) {
        self.inner.listeners.write().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use td_01_transaction::{InMemoryResourceManager, TransactionConfig, TransactionManager};

    fn manager() -> TransactionManager {
        TransactionManager::new(
            Arc::new(InMemoryResourceManager::new()),
            TransactionConfig::default(),
        )
    }

    fn p1() -> InstanceId {
        InstanceId::from("P1")
    }

    fn seeded(tm: &TransactionManager) -> InMemoryInstanceStore {
        let store = InMemoryInstanceStore::new();
        let tx = tm.begin().unwrap();
        store
            .create(&tx, ProcessInstance::new(p1(), "OrderProcess", 100))
            .unwrap();
        tx.commit().unwrap();
        store
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl InstanceListener for Recorder {
        fn on_finished(&self, id: &InstanceId, state: InstanceState) {
            self.events.lock().push(format!("finished:{id}:{state}"));
        }

        fn on_removed(&self, id: &InstanceId) {
            self.events.lock().push(format!("removed:{id}"));
        }
    }

    #[test]
    fn test_writes_visible_after_commit() {
        let tm = manager();
        let store = InMemoryInstanceStore::new();
        let tx = tm.begin().unwrap();
        store
            .create(&tx, ProcessInstance::new(p1(), "OrderProcess", 100))
            .unwrap();

        assert!(store.get(&p1()).is_none());
        assert!(store.get_in(&tx, &p1()).is_some());

        tx.commit().unwrap();
        assert_eq!(store.get(&p1()).unwrap().process, "OrderProcess");
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn test_rollback_discards_writes() {
        let tm = manager();
        let store = seeded(&tm);
        let tx = tm.begin().unwrap();
        store
            .set_state(&tx, &p1(), InstanceState::Retired, 200)
            .unwrap();
        tx.rollback().unwrap();

        assert_eq!(store.get(&p1()).unwrap().state, InstanceState::New);
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn test_set_state_returns_previous() {
        let tm = manager();
        let store = seeded(&tm);
        let tx = tm.begin().unwrap();
        assert_eq!(
            store.set_state(&tx, &p1(), InstanceState::Active, 150),
            Ok(InstanceState::New)
        );
        assert_eq!(
            store.set_state(&tx, &p1(), InstanceState::Retired, 200),
            Ok(InstanceState::Active)
        );
        tx.commit().unwrap();

        let instance = store.get(&p1()).unwrap();
        assert_eq!(instance.state, InstanceState::Retired);
        assert_eq!(instance.previous_state, Some(InstanceState::Active));
        assert_eq!(instance.last_active, 200);
    }

    #[test]
    fn test_finished_instance_cannot_resume() {
        let tm = manager();
        let store = seeded(&tm);
        let tx = tm.begin().unwrap();
        store
            .set_state(&tx, &p1(), InstanceState::Terminated, 150)
            .unwrap();
        let err = store
            .set_state(&tx, &p1(), InstanceState::Active, 160)
            .unwrap_err();
        assert!(matches!(err, InstanceStoreError::InvalidTransition { .. }));
        tx.commit().unwrap();
    }

    #[test]
    fn test_duplicate_and_missing() {
        let tm = manager();
        let store = seeded(&tm);
        let tx = tm.begin().unwrap();
        assert_eq!(
            store.create(&tx, ProcessInstance::new(p1(), "OrderProcess", 0)),
            Err(InstanceStoreError::DuplicateInstance(p1()))
        );
        let missing = InstanceId::from("P9");
        assert_eq!(
            store.delete(&tx, &missing),
            Err(InstanceStoreError::NotFound(missing))
        );
        tx.commit().unwrap();
    }

    #[test]
    fn test_listeners_hear_committed_changes_only() {
        let tm = manager();
        let store = seeded(&tm);
        let recorder = Arc::new(Recorder::default());
        store.add_listener(recorder.clone());

        let tx = tm.begin().unwrap();
        store
            .set_state(&tx, &p1(), InstanceState::Retired, 200)
            .unwrap();
        tx.rollback().unwrap();
        assert!(recorder.events.lock().is_empty());

        let tx = tm.begin().unwrap();
        store
            .set_state(&tx, &p1(), InstanceState::Retired, 200)
            .unwrap();
        tx.commit().unwrap();

        let tx = tm.begin().unwrap();
        store.delete(&tx, &p1()).unwrap();
        assert!(store.get_in(&tx, &p1()).is_none());
        tx.commit().unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["finished:P1:RETIRED".to_string(), "removed:P1".to_string()]
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_by_correlation() {
        let tm = manager();
        let store = seeded(&tm);
        let tx = tm.begin().unwrap();
        store
            .create(&tx, ProcessInstance::new(InstanceId::from("P2"), "OrderProcess", 0))
            .unwrap();
        store
            .set_correlation_key(&tx, &p1(), "orderId", "42")
            .unwrap();
        store
            .set_correlation_key(&tx, &InstanceId::from("P2"), "orderId", "43")
            .unwrap();
        assert!(store.find_by_correlation("orderId", "42").is_empty());
        tx.commit().unwrap();

        assert_eq!(store.find_by_correlation("orderId", "42"), vec![p1()]);
        assert_eq!(store.list_by_state(InstanceState::New).len(), 2);
    }
}
