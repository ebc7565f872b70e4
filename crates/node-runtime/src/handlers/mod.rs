//! # Job Handlers
//!
//! Handlers registered in the node's job dispatch table, one per job type.

pub mod exchange_timeout;
pub mod instance_commands;

pub use exchange_timeout::{ExchangeTimeoutHandler, EXCHANGE_TIMEOUT_JOB_TYPE};
pub use instance_commands::{InstanceCommand, InstanceCommandHandler, INSTANCE_JOB_TYPE};
