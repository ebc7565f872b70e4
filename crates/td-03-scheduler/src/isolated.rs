//! Handle to a transaction running on the worker pool.

use crate::error::{SchedulerError, SchedulerResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Result of [`SimpleScheduler::exec_isolated_transaction`](crate::SimpleScheduler::exec_isolated_transaction).
///
/// Await it from async code, or call [`wait`](Self::wait) from a thread that
/// is not driving a tokio runtime.
#[must_use = "an isolated transaction's outcome is only observable through its handle"]
pub struct IsolatedTransaction<T> {
    rx: oneshot::Receiver<SchedulerResult<T>>,
}

impl<T> IsolatedTransaction<T> {
    pub(crate) fn new(rx: oneshot::Receiver<SchedulerResult<T>>) -> Self {
        Self { rx }
    }

    /// Handle that is already resolved with `result`.
    pub(crate) fn ready(result: SchedulerResult<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Blocks the calling thread until the transaction finished.
    ///
    /// Panics if called from within an async context, like
    /// [`oneshot::Receiver::blocking_recv`].
    pub fn wait(self) -> SchedulerResult<T> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(SchedulerError::Abandoned))
    }
}

impl<T> Future for IsolatedTransaction<T> {
    type Output = SchedulerResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SchedulerError::Abandoned)))
    }
}
