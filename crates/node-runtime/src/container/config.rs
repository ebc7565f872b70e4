//! # Node Configuration
//!
//! Unified configuration for the scheduler, the transaction manager and the
//! exchange registry.
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TD_NODE_ID` | `scheduler.cluster.node_id` |
//! | `TD_WORKER_THREADS` | `scheduler.worker_threads` |
//! | `TD_TX_TIMEOUT_SECS` | `transactions.default_timeout` |
//! | `TD_MEX_TTL_SECS` | `registry.ttl` |
//! | `TD_SWEEP_INTERVAL_SECS` | `registry.min_sweep_interval` |

use shared_types::NodeId;
use std::str::FromStr;
use std::time::Duration;
use td_01_transaction::TransactionConfig;
use td_03_scheduler::SchedulerConfig;
use td_04_exchange_registry::RegistryConfig;
use thiserror::Error;

pub const ENV_NODE_ID: &str = "TD_NODE_ID";
pub const ENV_WORKER_THREADS: &str = "TD_WORKER_THREADS";
pub const ENV_TX_TIMEOUT_SECS: &str = "TD_TX_TIMEOUT_SECS";
pub const ENV_MEX_TTL_SECS: &str = "TD_MEX_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "TD_SWEEP_INTERVAL_SECS";

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Scheduler and cluster settings.
    pub scheduler: SchedulerConfig,
    /// Transaction manager settings.
    pub transactions: TransactionConfig,
    /// Message exchange registry settings.
    pub registry: RegistryConfig,
}

impl NodeConfig {
    /// Default configuration with overrides read from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(node_id) = lookup(ENV_NODE_ID) {
            self.scheduler.cluster.node_id = NodeId::new(node_id);
        }
        if let Some(value) = lookup(ENV_WORKER_THREADS) {
            self.scheduler.worker_threads = parse(ENV_WORKER_THREADS, &value)?;
        }
        if let Some(value) = lookup(ENV_TX_TIMEOUT_SECS) {
            self.transactions.default_timeout = secs(ENV_TX_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_MEX_TTL_SECS) {
            self.registry.ttl = secs(ENV_MEX_TTL_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_SWEEP_INTERVAL_SECS) {
            self.registry.min_sweep_interval = Some(secs(ENV_SWEEP_INTERVAL_SECS, &value)?);
        }
        Ok(())
    }

    /// Rejects settings the node cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scheduler = &self.scheduler;
        if scheduler.node_id().as_str().trim().is_empty() {
            return Err(ConfigError::EmptyNodeId);
        }
        if scheduler.worker_threads == 0 {
            return Err(ConfigError::Zero("worker_threads"));
        }
        if scheduler.transactions_per_second == 0 {
            return Err(ConfigError::Zero("transactions_per_second"));
        }
        if scheduler.immediate_interval.is_zero() {
            return Err(ConfigError::Zero("immediate_interval"));
        }
        if scheduler.near_future_interval <= scheduler.immediate_interval {
            return Err(ConfigError::Inconsistent(
                "near_future_interval must exceed immediate_interval".into(),
            ));
        }
        let cluster = &scheduler.cluster;
        if cluster.heartbeat_interval.is_zero() {
            return Err(ConfigError::Zero("heartbeat_interval"));
        }
        if cluster.heartbeat_interval >= cluster.stale_interval {
            return Err(ConfigError::Inconsistent(
                "heartbeat_interval must be shorter than stale_interval".into(),
            ));
        }
        if cluster.lease_duration <= cluster.heartbeat_interval {
            return Err(ConfigError::Inconsistent(
                "lease_duration must exceed heartbeat_interval".into(),
            ));
        }
        if self.transactions.default_timeout.is_zero() {
            return Err(ConfigError::Zero("transaction timeout"));
        }
        if self.registry.ttl.is_zero() {
            return Err(ConfigError::Zero("exchange ttl"));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

fn secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse::<u64>(var, value).map(Duration::from_secs)
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Environment variable {var} has invalid value '{value}'")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Node id must not be empty; set {}", ENV_NODE_ID)]
    EmptyNodeId,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}
