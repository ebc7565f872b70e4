//! Job processor port.

use crate::error::JobProcessorError;
use serde::{Deserialize, Serialize};
use shared_types::{JobDetails, JobId, Timestamp};
use td_01_transaction::TransactionContext;

/// What a processor learns about the job it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: JobId,
    pub details: JobDetails,
    pub due_at: Option<Timestamp>,
    pub persisted: bool,
    pub transacted: bool,
}

impl JobInfo {
    pub fn job_type(&self) -> &str {
        &self.details.job_type
    }
}

/// Application callback invoked for every due job.
///
/// `tx` is present for transacted jobs; returning an error rolls it back.
/// Failed jobs are dropped, never retried.
pub trait JobProcessor: Send + Sync {
    fn on_scheduled_job(
        &self,
        job: &JobInfo,
        tx: Option<&TransactionContext>,
    ) -> Result<(), JobProcessorError>;
}

/// Handler for one job type, registered in a
/// [`JobDispatcher`](crate::adapters::JobDispatcher).
pub trait JobHandler: Send + Sync {
    fn handle(&self, job: &JobInfo, tx: Option<&TransactionContext>)
        -> Result<(), JobProcessorError>;
}

impl<F> JobHandler for F
where
    F: Fn(&JobInfo, Option<&TransactionContext>) -> Result<(), JobProcessorError> + Send + Sync,
{
    fn handle(
        &self,
        job: &JobInfo,
        tx: Option<&TransactionContext>,
    ) -> Result<(), JobProcessorError> {
        self(job, tx)
    }
}
