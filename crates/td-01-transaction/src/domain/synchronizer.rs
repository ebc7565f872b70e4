//! Completion hooks.
//!
//! A synchronizer is either a single closure bound to one phase, or a shared
//! listener that observes both phases.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Result returned by hook bodies. Errors are logged and swallowed.
pub type HookResult = anyhow::Result<()>;

type BeforeHook = Box<dyn FnOnce() -> HookResult + Send>;
type AfterHook = Box<dyn FnOnce(bool) -> HookResult + Send>;

/// Listener observing both completion phases.
pub trait Synchronization: Send + Sync {
    /// Called before the resource commit. Never called on rollback.
    fn before_completion(&self) -> HookResult {
        Ok(())
    }

    /// Called once the outcome is known.
    fn after_completion(&self, committed: bool) -> HookResult;
}

/// A hook registered on a [`TransactionContext`](super::TransactionContext).
pub enum Synchronizer {
    /// Runs once, before the resource commit.
    Before(BeforeHook),
    /// Runs once with the outcome (`true` on commit).
    After(AfterHook),
    /// Shared listener receiving both callbacks.
    Pair(Arc<dyn Synchronization>),
}

impl Synchronizer {
    pub fn before<F>(hook: F) -> Self
    where
        F: FnOnce() -> HookResult + Send + 'static,
    {
        Self::Before(Box::new(hook))
    }

    pub fn after<F>(hook: F) -> Self
    where
        F: FnOnce(bool) -> HookResult + Send + 'static,
    {
        Self::After(Box::new(hook))
    }

    /// After hook that only fires when the transaction committed.
    pub fn on_commit<F>(hook: F) -> Self
    where
        F: FnOnce() -> HookResult + Send + 'static,
    {
        Self::after(move |committed| if committed { hook() } else { Ok(()) })
    }

    /// After hook that only fires when the transaction rolled back.
    pub fn on_rollback<F>(hook: F) -> Self
    where
        F: FnOnce() -> HookResult + Send + 'static,
    {
        Self::after(move |committed| if committed { Ok(()) } else { hook() })
    }

    pub fn pair(listener: Arc<dyn Synchronization>) -> Self {
        Self::Pair(listener)
    }
}

impl fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Before(_) => f.write_str("Synchronizer::Before"),
            Self::After(_) => f.write_str("Synchronizer::After"),
            Self::Pair(_) => f.write_str("Synchronizer::Pair"),
        }
    }
}

/// Runs a hook, swallowing both errors and panics.
pub(crate) fn run_guarded<F>(tx_id: &str, phase: &'static str, hook: F)
where
    F: FnOnce() -> HookResult,
{
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(tx_id, phase, error = %e, "Synchronizer failed; continuing");
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            warn!(tx_id, phase, panic = %message, "Synchronizer panicked; continuing");
        }
    }
}
