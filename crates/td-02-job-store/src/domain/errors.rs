//! Job store error types.

use shared_types::JobId;
use thiserror::Error;

/// Job store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobStoreError {
    /// The job was claimed, cancelled or finished by someone else.
    #[error("Job {0} no longer in store")]
    JobNoLongerInDb(JobId),

    /// A job with this id already exists.
    #[error("Duplicate job id: {0}")]
    DuplicateJob(JobId),

    /// The job is not in the state the operation requires.
    #[error("Job {job_id} is {actual}, expected {expected}")]
    InvalidState {
        job_id: JobId,
        expected: &'static str,
        actual: String,
    },

    /// The backing store cannot be reached.
    #[error("Job store unavailable: {0}")]
    Unavailable(String),

    /// A record could not be encoded or decoded.
    #[error("Job record encoding failed: {0}")]
    Encoding(String),
}

/// Result type for job store operations.
pub type JobStoreResult<T> = Result<T, JobStoreError>;
