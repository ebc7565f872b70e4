//! Administrative commands on process instances.
//!
//! A command is a persisted job of type [`INSTANCE_JOB_TYPE`] whose details
//! carry `op` (the command) and `pid` (the instance id).

use shared_types::{InstanceId, JobDetails, TimeSource};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use td_01_transaction::TransactionContext;
use td_03_scheduler::{JobHandler, JobInfo, JobProcessorError};
use td_05_instance_store::{InstanceState, ProcessInstanceStore};
use tracing::info;

pub const INSTANCE_JOB_TYPE: &str = "instance";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceCommand {
    Retire,
    Terminate,
    Suspend,
    Resume,
}

impl InstanceCommand {
    /// State the instance is moved to.
    pub fn target_state(&self) -> InstanceState {
        match self {
            Self::Retire => InstanceState::Retired,
            Self::Terminate => InstanceState::Terminated,
            Self::Suspend => InstanceState::Suspended,
            Self::Resume => InstanceState::Active,
        }
    }

    /// Job details for running this command against `pid`.
    pub fn job(&self, pid: &InstanceId) -> JobDetails {
        JobDetails::new(INSTANCE_JOB_TYPE)
            .with("op", self.to_string())
            .with("pid", pid.as_str())
    }
}

impl fmt::Display for InstanceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Retire => "retire",
            Self::Terminate => "terminate",
            Self::Suspend => "suspend",
            Self::Resume => "resume",
        };
        f.write_str(op)
    }
}

impl FromStr for InstanceCommand {
    type Err = JobProcessorError;

    fn from_str(op: &str) -> Result<Self, Self::Err> {
        match op {
            "retire" => Ok(Self::Retire),
            "terminate" => Ok(Self::Terminate),
            "suspend" => Ok(Self::Suspend),
            "resume" => Ok(Self::Resume),
            other => Err(JobProcessorError::Failed(format!(
                "unknown instance command '{other}'"
            ))),
        }
    }
}

/// Applies [`InstanceCommand`]s inside the job's transaction.
pub struct InstanceCommandHandler {
    instances: Arc<dyn ProcessInstanceStore>,
    time: Arc<dyn TimeSource>,
}

impl InstanceCommandHandler {
    pub fn new(instances: Arc<dyn ProcessInstanceStore>, time: Arc<dyn TimeSource>) -> Self {
        Self { instances, time }
    }
}

impl JobHandler for InstanceCommandHandler {
    fn handle(
        &self,
        job: &JobInfo,
        tx: Option<&TransactionContext>,
    ) -> Result<(), JobProcessorError> {
        let tx = tx.ok_or_else(|| {
            JobProcessorError::Failed("instance commands must run in a transaction".into())
        })?;
        let command: InstanceCommand = job
            .details
            .get("op")
            .ok_or_else(|| JobProcessorError::Failed("missing 'op' entry".into()))?
            .parse()?;
        let pid = job
            .details
            .get("pid")
            .map(InstanceId::from)
            .ok_or_else(|| JobProcessorError::Failed("missing 'pid' entry".into()))?;

        let previous = self
            .instances
            .set_state(tx, &pid, command.target_state(), self.time.now())
            .map_err(anyhow::Error::from)?;
        info!(
            job_id = %job.job_id,
            instance = %pid,
            %command,
            from = %previous,
            to = %command.target_state(),
            "Instance command applied"
        );
        Ok(())
    }
}
