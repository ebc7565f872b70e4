//! Process instance record.

use serde::{Deserialize, Serialize};
use shared_types::{InstanceId, Timestamp};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstanceState {
    #[default]
    New,
    Ready,
    Active,
    Suspended,
    CompletedOk,
    CompletedWithFault,
    Terminated,
    /// Taken out of service by an administrative job.
    Retired,
}

impl InstanceState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Self::CompletedOk | Self::CompletedWithFault | Self::Terminated | Self::Retired
        )
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "NEW",
            Self::Ready => "READY",
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::CompletedOk => "COMPLETED_OK",
            Self::CompletedWithFault => "COMPLETED_WITH_FAULT",
            Self::Terminated => "TERMINATED",
            Self::Retired => "RETIRED",
        };
        f.write_str(name)
    }
}

/// A process instance as seen by the scheduler's job handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: InstanceId,
    /// Name of the deployed process this instance runs.
    pub process: String,
    pub state: InstanceState,
    pub previous_state: Option<InstanceState>,
    pub last_active: Timestamp,
    /// Correlation set name to key value.
    #[serde(default)]
    pub correlation_keys: BTreeMap<String, String>,
}

impl ProcessInstance {
    pub fn new(id: InstanceId, process: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id,
            process: process.into(),
            state: InstanceState::New,
            previous_state: None,
            last_active: now,
            correlation_keys: BTreeMap::new(),
        }
    }

    /// Moves to `state`, remembering where it came from.
    pub(crate) fn transition(&mut self, state: InstanceState, now: Timestamp) {
        self.previous_state = Some(self.state);
        self.state = state;
        self.last_active = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_states() {
        assert!(InstanceState::Retired.is_finished());
        assert!(InstanceState::Terminated.is_finished());
        assert!(!InstanceState::Suspended.is_finished());
        assert!(!InstanceState::default().is_finished());
    }

    #[test]
    fn test_transition_tracks_previous_state() {
        let mut instance = ProcessInstance::new(InstanceId::from("P1"), "Order", 10);
        instance.transition(InstanceState::Active, 20);
        instance.transition(InstanceState::Retired, 30);
        assert_eq!(instance.state, InstanceState::Retired);
        assert_eq!(instance.previous_state, Some(InstanceState::Active));
        assert_eq!(instance.last_active, 30);
    }

    #[test]
    fn test_json_shape() {
        let instance = ProcessInstance::new(InstanceId::from("P1"), "Order", 10);
        let json = serde_json::to_value(&instance).unwrap();
        assert_eq!(json["id"], "P1");
        assert_eq!(json["state"], "New");
        assert!(json["previous_state"].is_null());
    }
}
