//! Dispatch table from job type tags to handlers.

use crate::error::JobProcessorError;
use crate::ports::{JobHandler, JobInfo, JobProcessor};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use td_01_transaction::TransactionContext;
use tracing::debug;

/// [`JobProcessor`] that routes each job to the handler registered for its
/// type tag.
#[derive(Default)]
pub struct JobDispatcher {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl JobDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `job_type`, replacing any previous one.
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        debug!(job_type = %job_type, "Registered job handler");
        self.handlers.write().insert(job_type, handler);
    }

    /// Registers a closure as the handler for `job_type`.
    pub fn register_fn<F>(&self, job_type: impl Into<String>, handler: F)
    where
        F: Fn(&JobInfo, Option<&TransactionContext>) -> Result<(), JobProcessorError>
            + Send
            + Sync
            + 'static,
    {
        self.register(job_type, Arc::new(handler));
    }

    pub fn unregister(&self, job_type: &str) -> bool {
        self.handlers.write().remove(job_type).is_some()
    }

    pub fn handles(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobProcessor for JobDispatcher {
    fn on_scheduled_job(
        &self,
        job: &JobInfo,
        tx: Option<&TransactionContext>,
    ) -> Result<(), JobProcessorError> {
        let handler = self
            .handlers
            .read()
            .get(job.job_type())
            .cloned()
            .ok_or_else(|| JobProcessorError::UnknownJobType(job.job_type().to_string()))?;
        handler.handle(job, tx)
    }
}
