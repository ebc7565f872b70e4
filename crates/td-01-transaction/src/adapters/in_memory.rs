//! In-memory resource manager.
//!
//! Holds no data of its own; the stores that participate in a transaction
//! stage their writes and publish them from synchronizers. Counts outcomes
//! and can be told to fail the next begin or commit.

use crate::domain::TxId;
use crate::error::{TxError, TxResult};
use crate::ports::{ResourceManager, ResourceTransaction};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    fail_next_begin: AtomicBool,
    fail_next_commit: AtomicBool,
}

/// Resource manager backed by nothing but counters.
#[derive(Debug, Default)]
pub struct InMemoryResourceManager {
    counters: Arc<Counters>,
}

impl InMemoryResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `begin` fails with `ResourceUnavailable`.
    pub fn fail_next_begin(&self) {
        self.counters.fail_next_begin.store(true, Ordering::SeqCst);
    }

    /// The next resource commit fails.
    pub fn fail_next_commit(&self) {
        self.counters.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub fn begun_count(&self) -> u64 {
        self.counters.begun.load(Ordering::SeqCst)
    }

    pub fn committed_count(&self) -> u64 {
        self.counters.committed.load(Ordering::SeqCst)
    }

    pub fn rolled_back_count(&self) -> u64 {
        self.counters.rolled_back.load(Ordering::SeqCst)
    }
}

impl ResourceManager for InMemoryResourceManager {
    fn begin(&self, tx_id: &TxId, _timeout: Duration) -> TxResult<Box<dyn ResourceTransaction>> {
        if self.counters.fail_next_begin.swap(false, Ordering::SeqCst) {
            return Err(TxError::ResourceUnavailable(format!(
                "injected begin failure for {tx_id}"
            )));
        }
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryTransaction {
            tx_id: *tx_id,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct InMemoryTransaction {
    tx_id: TxId,
    counters: Arc<Counters>,
}

impl ResourceTransaction for InMemoryTransaction {
    fn commit(&mut self) -> TxResult<()> {
        if self.counters.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(TxError::CommitFailed {
                tx_id: self.tx_id.to_string(),
                reason: "injected commit failure".to_string(),
            });
        }
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&mut self) -> TxResult<()> {
        self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
