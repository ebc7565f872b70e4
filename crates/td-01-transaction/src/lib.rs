//! # Transaction Subsystem
//!
//! Unit-of-work boundaries for the scheduler, the job store and the exchange
//! registry.
//!
//! ## Purpose
//!
//! A [`TransactionContext`] represents one unit of work. It owns an ordered
//! list of synchronizers and a rollback-only flag, and it drives the
//! underlying resource transaction (the durable store's own transaction) to
//! commit or rollback.
//!
//! ## Lifecycle
//!
//! ```text
//! begin() ──→ [ACTIVE] ──set_rollback_only()──→ [MARKED_ROLLBACK]
//!                │                                     │
//!             commit()                        commit() / rollback()
//!                │                                     │
//!                ▼                                     ▼
//!          [PREPARING] ── before hooks ──→ [COMMITTING] ──ok──→ [COMMITTED]
//!                                               │
//!                                               └──fail──→ [ROLLED_BACK]
//! ```
//!
//! ## Synchronizer Ordering
//!
//! | Phase | Runs on | Order |
//! |-------|---------|-------|
//! | `before_completion` | commit only | registration order |
//! | `after_completion(committed)` | commit and rollback | registration order |
//!
//! Every before hook completes before the first after hook starts. Hook
//! errors and panics are logged and swallowed so one misbehaving listener
//! cannot block completion or starve the listeners registered after it.
//!
//! ## Thread Association
//!
//! The [`TransactionManager`] keeps an explicit table of which thread owns
//! which active context. `begin()` on a thread that already owns an active
//! context fails with [`TxError::IllegalState`].
//!
//! ## Module Structure
//!
//! ```text
//! domain/    - TransactionContext, Synchronizer, TxStatus
//! ports/     - ResourceManager / ResourceTransaction SPI
//! adapters/  - In-memory resource manager with fault injection
//! manager.rs - TransactionManager (begin, thread table, timeouts)
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod manager;
pub mod ports;

pub use adapters::InMemoryResourceManager;
pub use domain::{
    HookResult, Synchronization, Synchronizer, TransactionContext, TxId, TxStatus,
};
pub use error::{TxError, TxResult};
pub use manager::{TimeoutGuard, TransactionConfig, TransactionManager};
pub use ports::{ResourceManager, ResourceTransaction};
