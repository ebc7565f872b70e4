//! Fails outbound exchanges whose partner never answered.

use shared_types::{ExchangeId, JobDetails};
use std::sync::Arc;
use td_01_transaction::TransactionContext;
use td_03_scheduler::{JobHandler, JobInfo, JobProcessorError};
use td_04_exchange_registry::{Completion, FailureType, MessageExchangeRegistry};
use tracing::{debug, info};

pub const EXCHANGE_TIMEOUT_JOB_TYPE: &str = "mex-timeout";

pub struct ExchangeTimeoutHandler {
    registry: Arc<MessageExchangeRegistry>,
}

impl ExchangeTimeoutHandler {
    pub fn new(registry: Arc<MessageExchangeRegistry>) -> Self {
        Self { registry }
    }

    /// Job details for a timeout check on `exchange`.
    pub fn job(exchange: &ExchangeId) -> JobDetails {
        JobDetails::new(EXCHANGE_TIMEOUT_JOB_TYPE).with("mex", exchange.as_str())
    }
}

impl JobHandler for ExchangeTimeoutHandler {
    fn handle(
        &self,
        job: &JobInfo,
        _tx: Option<&TransactionContext>,
    ) -> Result<(), JobProcessorError> {
        let id = job
            .details
            .get("mex")
            .map(ExchangeId::from)
            .ok_or_else(|| JobProcessorError::Failed("missing 'mex' entry".into()))?;

        if self.registry.get(&id).is_none() {
            debug!(exchange = %id, "Exchange already gone; nothing to time out");
            return Ok(());
        }
        let outcome = self
            .registry
            .fail(
                &id,
                FailureType::NoResponse,
                Some("partner did not respond in time".into()),
            )
            .map_err(anyhow::Error::from)?;
        if outcome == Completion::Completed {
            info!(exchange = %id, job_id = %job.job_id, "Exchange timed out");
        }
        Ok(())
    }
}
