//! Error types for the scheduler.

use thiserror::Error;

/// Boxed error carried as the cause of a failed transaction.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the scheduler API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A transaction or store operation failed; the cause is attached.
    #[error("{reason}")]
    Context {
        reason: String,
        #[source]
        source: BoxError,
    },

    /// `start()` was called before a job processor was registered.
    #[error("No job processor registered")]
    NoProcessor,

    /// The scheduler is not running (never started, or shut down).
    #[error("Scheduler is not running")]
    NotRunning,

    /// The worker running an isolated transaction went away without a result.
    #[error("Isolated transaction abandoned before completion")]
    Abandoned,
}

impl SchedulerError {
    pub(crate) fn context(reason: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Context {
            reason: reason.into(),
            source: source.into(),
        }
    }
}

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors returned by job processors and handlers.
#[derive(Debug, Error)]
pub enum JobProcessorError {
    /// The dispatch table has no handler for the job's type tag.
    #[error("No handler registered for job type '{0}'")]
    UnknownJobType(String),

    /// The handler rejected the job.
    #[error("Job processing failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the coordinator lease table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    #[error("Lease table unavailable: {0}")]
    Unavailable(String),
}
