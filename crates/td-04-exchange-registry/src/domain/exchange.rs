//! The message exchange entity.
//!
//! The status lives in a single atomic byte so that completion and eviction
//! can race without a lock: whichever compare-and-swap lands first wins.
//!
//! ```text
//!   bit 7      bits 0..6
//! ┌────────┬──────────────┐
//! │DETACHED│ status code  │
//! └────────┴──────────────┘
//! ```
//!
//! Everything else sits behind a per-exchange mutex.

use crate::error::{RegistryError, RegistryResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{ExchangeId, InstanceId, InteractionPattern, Timestamp};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Which side of the conversation this engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Inbound: a partner invokes one of our operations.
    MyRole,
    /// Outbound: we invoke a partner.
    PartnerRole,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MyRole => f.write_str("MY_ROLE"),
            Self::PartnerRole => f.write_str("PARTNER_ROLE"),
        }
    }
}

/// Exchange status. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeStatus {
    New,
    Invoked,
    AsyncWait,
    CompletedOk,
    CompletedWithFault,
    Failed,
}

impl ExchangeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::CompletedOk | Self::CompletedWithFault | Self::Failed
        )
    }

    fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Invoked => 1,
            Self::AsyncWait => 2,
            Self::CompletedOk | Self::CompletedWithFault | Self::Failed => 3,
        }
    }

    fn code(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Invoked => 1,
            Self::AsyncWait => 2,
            Self::CompletedOk => 3,
            Self::CompletedWithFault => 4,
            Self::Failed => 5,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            0 => Self::New,
            1 => Self::Invoked,
            2 => Self::AsyncWait,
            3 => Self::CompletedOk,
            4 => Self::CompletedWithFault,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "NEW",
            Self::Invoked => "INVOKED",
            Self::AsyncWait => "ASYNC_WAIT",
            Self::CompletedOk => "COMPLETED_OK",
            Self::CompletedWithFault => "COMPLETED_FAULT",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CorrelationStatus {
    #[default]
    Uncorrelated,
    Correlated,
    Ambiguous,
}

/// How the caller waits for the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InvocationStyle {
    #[default]
    Blocking,
    Async,
    /// The outcome is forwarded to another exchange.
    Piped(ExchangeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureType {
    InvalidEndpoint,
    UnknownEndpoint,
    UnknownOperation,
    CommunicationError,
    FormatError,
    NoResponse,
    Aborted,
    Other,
}

/// What the partner acknowledged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckType {
    Response,
    Fault,
    Failure,
    OneWay,
}

/// Outcome of a completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// This call set the terminal status.
    Completed,
    /// The exchange was already terminal; nothing changed.
    AlreadyCompleted(ExchangeStatus),
}

const DETACHED: u8 = 0x80;
const CODE_MASK: u8 = 0x7f;

/// Lock-free status word.
#[derive(Debug)]
struct StatusCell(AtomicU8);

impl StatusCell {
    fn new(status: ExchangeStatus) -> Self {
        Self(AtomicU8::new(status.code()))
    }

    fn load(&self) -> (ExchangeStatus, bool) {
        let raw = self.0.load(Ordering::Acquire);
        (
            ExchangeStatus::from_code(raw & CODE_MASK),
            raw & DETACHED != 0,
        )
    }

    /// Applies `step` to the current status until the CAS lands or `step`
    /// declines. `step` returns the next status or the value to return.
    fn update<R>(
        &self,
        mut step: impl FnMut(ExchangeStatus, bool) -> Result<ExchangeStatus, R>,
    ) -> Result<ExchangeStatus, R> {
        let mut raw = self.0.load(Ordering::Acquire);
        loop {
            let current = ExchangeStatus::from_code(raw & CODE_MASK);
            let next = step(current, raw & DETACHED != 0)?;
            let next_raw = next.code() | (raw & DETACHED);
            match self
                .0
                .compare_exchange(raw, next_raw, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(current),
                Err(actual) => raw = actual,
            }
        }
    }

    /// Sets the detached bit unless the status is terminal.
    fn detach_if_unfinished(&self) -> bool {
        let mut raw = self.0.load(Ordering::Acquire);
        loop {
            if raw & DETACHED != 0 || ExchangeStatus::from_code(raw & CODE_MASK).is_terminal() {
                return false;
            }
            match self.0.compare_exchange(
                raw,
                raw | DETACHED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => raw = actual,
            }
        }
    }

    /// Sets the detached bit. Returns `false` if it was already set.
    fn detach(&self) -> bool {
        self.0.fetch_or(DETACHED, Ordering::AcqRel) & DETACHED == 0
    }
}

#[derive(Debug, Default)]
struct ExchangeFields {
    pattern: Option<InteractionPattern>,
    operation: Option<String>,
    correlation_status: CorrelationStatus,
    invocation_style: InvocationStyle,
    fault: Option<String>,
    fault_explanation: Option<String>,
    failure_type: Option<FailureType>,
    ack_type: Option<AckType>,
    timeout_ms: Option<u64>,
    instance: Option<InstanceId>,
    channel: Option<String>,
    properties: BTreeMap<String, String>,
}

/// One request/response conversation with a partner.
#[derive(Debug)]
pub struct MessageExchange {
    id: ExchangeId,
    direction: Direction,
    created_at: Timestamp,
    status: StatusCell,
    fields: Mutex<ExchangeFields>,
}

impl MessageExchange {
    pub fn new(id: ExchangeId, direction: Direction, created_at: Timestamp) -> Self {
        Self {
            id,
            direction,
            created_at,
            status: StatusCell::new(ExchangeStatus::New),
            fields: Mutex::new(ExchangeFields::default()),
        }
    }

    pub fn id(&self) -> &ExchangeId {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn status(&self) -> ExchangeStatus {
        self.status.load().0
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// True once the exchange left the registry (evicted, released or
    /// rolled back).
    pub fn is_detached(&self) -> bool {
        self.status.load().1
    }

    /// Moves to a later non-terminal status. Re-applying the current status
    /// is a no-op.
    pub fn advance(&self, to: ExchangeStatus) -> RegistryResult<()> {
        if to.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                id: self.id.clone(),
                from: self.status(),
                to,
            });
        }
        self.status
            .update(|current, detached| {
                if detached {
                    return Err(RegistryError::Detached(self.id.clone()));
                }
                if current.is_terminal() || to.rank() < current.rank() {
                    return Err(RegistryError::InvalidTransition {
                        id: self.id.clone(),
                        from: current,
                        to,
                    });
                }
                Ok(to)
            })
            .map(|_| ())
    }

    /// Sets a terminal status. Idempotent: once terminal, later calls change
    /// nothing and report the status already set.
    pub fn complete(&self, to: ExchangeStatus) -> RegistryResult<Completion> {
        if !to.is_terminal() {
            return Err(RegistryError::NotTerminal(to));
        }
        let result = self.status.update(|current, detached| {
            if current.is_terminal() {
                return Err(Ok(Completion::AlreadyCompleted(current)));
            }
            if detached {
                return Err(Err(RegistryError::Detached(self.id.clone())));
            }
            Ok(to)
        });
        match result {
            Ok(_) => Ok(Completion::Completed),
            Err(outcome) => outcome,
        }
    }

    pub(crate) fn try_evict(&self) -> bool {
        self.status.detach_if_unfinished()
    }

    pub(crate) fn detach(&self) -> bool {
        self.status.detach()
    }

    pub fn pattern(&self) -> Option<InteractionPattern> {
        self.fields.lock().pattern
    }

    pub fn set_pattern(&self, pattern: InteractionPattern) {
        self.fields.lock().pattern = Some(pattern);
    }

    pub fn operation(&self) -> Option<String> {
        self.fields.lock().operation.clone()
    }

    pub fn set_operation(&self, operation: impl Into<String>) {
        self.fields.lock().operation = Some(operation.into());
    }

    pub fn correlation_status(&self) -> CorrelationStatus {
        self.fields.lock().correlation_status
    }

    pub fn set_correlation_status(&self, status: CorrelationStatus) {
        self.fields.lock().correlation_status = status;
    }

    pub fn invocation_style(&self) -> InvocationStyle {
        self.fields.lock().invocation_style.clone()
    }

    pub fn set_invocation_style(&self, style: InvocationStyle) {
        self.fields.lock().invocation_style = style;
    }

    /// Fault code and explanation, if a fault was recorded.
    pub fn fault(&self) -> Option<(String, Option<String>)> {
        let fields = self.fields.lock();
        fields
            .fault
            .clone()
            .map(|code| (code, fields.fault_explanation.clone()))
    }

    pub fn set_fault(&self, code: impl Into<String>, explanation: Option<String>) {
        let mut fields = self.fields.lock();
        fields.fault = Some(code.into());
        fields.fault_explanation = explanation;
    }

    pub fn failure_type(&self) -> Option<FailureType> {
        self.fields.lock().failure_type
    }

    pub fn set_failure(&self, failure: FailureType, explanation: Option<String>) {
        let mut fields = self.fields.lock();
        fields.failure_type = Some(failure);
        fields.fault_explanation = explanation;
    }

    pub fn ack_type(&self) -> Option<AckType> {
        self.fields.lock().ack_type
    }

    pub fn set_ack_type(&self, ack: AckType) {
        self.fields.lock().ack_type = Some(ack);
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.fields.lock().timeout_ms
    }

    pub fn set_timeout_ms(&self, timeout_ms: u64) {
        self.fields.lock().timeout_ms = Some(timeout_ms);
    }

    pub fn instance(&self) -> Option<InstanceId> {
        self.fields.lock().instance.clone()
    }

    pub fn set_instance(&self, instance: InstanceId) {
        self.fields.lock().instance = Some(instance);
    }

    pub fn channel(&self) -> Option<String> {
        self.fields.lock().channel.clone()
    }

    pub fn set_channel(&self, channel: impl Into<String>) {
        self.fields.lock().channel = Some(channel.into());
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.fields.lock().properties.get(key).cloned()
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.lock().properties.insert(key.into(), value.into());
    }

    /// Copies fault and failure information onto `target`.
    pub(crate) fn copy_outcome_to(&self, target: &MessageExchange) {
        let (fault, explanation, failure) = {
            let fields = self.fields.lock();
            (
                fields.fault.clone(),
                fields.fault_explanation.clone(),
                fields.failure_type,
            )
        };
        let mut target_fields = target.fields.lock();
        target_fields.fault = fault;
        target_fields.fault_explanation = explanation;
        target_fields.failure_type = failure;
    }

    /// Binding-facing view of the exchange.
    pub fn snapshot(&self) -> ExchangeSnapshot {
        let fields = self.fields.lock();
        ExchangeSnapshot {
            exchange_id: self.id.clone(),
            direction: self.direction,
            pattern: fields.pattern,
            operation: fields.operation.clone(),
            status: self.status(),
            correlation_status: fields.correlation_status,
            fault: fields.fault.clone(),
            fault_explanation: fields.fault_explanation.clone(),
            timeout_ms: fields.timeout_ms,
        }
    }
}

/// Serializable view handed to the binding layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSnapshot {
    pub exchange_id: ExchangeId,
    pub direction: Direction,
    pub pattern: Option<InteractionPattern>,
    pub operation: Option<String>,
    pub status: ExchangeStatus,
    pub correlation_status: CorrelationStatus,
    pub fault: Option<String>,
    pub fault_explanation: Option<String>,
    pub timeout_ms: Option<u64>,
}
