//! Transaction manager.
//!
//! Starts contexts, tracks which thread owns which active context, and holds
//! the per-thread timeout overrides.

use crate::domain::context::ThreadTable;
use crate::domain::{TransactionContext, TxId};
use crate::error::TxResult;
use crate::ports::ResourceManager;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::debug;

/// Transaction manager configuration.
#[derive(Debug, Clone)]
pub struct TransactionConfig {
    /// Timeout applied when the calling thread has no override.
    pub default_timeout: Duration,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(60),
        }
    }
}

/// Begins transactions against a [`ResourceManager`].
pub struct TransactionManager {
    resources: Arc<dyn ResourceManager>,
    config: TransactionConfig,
    active: Arc<ThreadTable>,
    timeouts: Mutex<HashMap<ThreadId, Duration>>,
}

impl TransactionManager {
    pub fn new(resources: Arc<dyn ResourceManager>, config: TransactionConfig) -> Self {
        Self {
            resources,
            config,
            active: Arc::new(ThreadTable::default()),
            timeouts: Mutex::new(HashMap::new()),
        }
    }

    /// Begins a new transaction owned by the calling thread.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if this thread already owns an active transaction
    /// - `ResourceUnavailable` if the resource manager refuses to begin
    pub fn begin(&self) -> TxResult<TransactionContext> {
        let thread = thread::current().id();
        let tx_id = TxId::generate();
        self.active.claim(thread, tx_id)?;

        let timeout = self.timeout();
        let resource = match self.resources.begin(&tx_id, timeout) {
            Ok(resource) => resource,
            Err(e) => {
                self.active.release(thread, tx_id);
                return Err(e);
            }
        };

        debug!(tx_id = %tx_id, timeout_ms = timeout.as_millis() as u64, "Transaction started");
        Ok(TransactionContext::new(
            tx_id,
            timeout,
            resource,
            Arc::clone(&self.active),
        ))
    }

    /// The active transaction of the calling thread, if any.
    pub fn active_transaction(&self) -> Option<TxId> {
        self.active.get(thread::current().id())
    }

    /// Whether the calling thread has an active transaction.
    pub fn is_transacted(&self) -> bool {
        self.active_transaction().is_some()
    }

    /// Number of threads currently inside a transaction.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Sets the timeout for transactions begun later on this thread.
    /// `None` restores the default.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        let thread = thread::current().id();
        let mut timeouts = self.timeouts.lock();
        match timeout {
            Some(t) => {
                timeouts.insert(thread, t);
            }
            None => {
                timeouts.remove(&thread);
            }
        }
    }

    /// Timeout that `begin()` would use on this thread.
    pub fn timeout(&self) -> Duration {
        self.timeouts
            .lock()
            .get(&thread::current().id())
            .copied()
            .unwrap_or(self.config.default_timeout)
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.default_timeout
    }

    /// Overrides this thread's timeout until the guard is dropped.
    pub fn timeout_guard(&self, timeout: Option<Duration>) -> TimeoutGuard<'_> {
        let thread = thread::current().id();
        let previous = self.timeouts.lock().get(&thread).copied();
        if timeout.is_some() {
            self.set_timeout(timeout);
        }
        TimeoutGuard {
            manager: self,
            thread,
            previous,
        }
    }
}

/// Restores the previous timeout override on drop.
pub struct TimeoutGuard<'a> {
    manager: &'a TransactionManager,
    thread: ThreadId,
    previous: Option<Duration>,
}

impl Drop for TimeoutGuard<'_> {
    fn drop(&mut self) {
        let mut timeouts = self.manager.timeouts.lock();
        match self.previous {
            Some(t) => {
                timeouts.insert(self.thread, t);
            }
            None => {
                timeouts.remove(&self.thread);
            }
        }
    }
}
