//! Cross-crate integration flows.

pub mod claim_race;
pub mod exchange_flows;
pub mod scenarios;
pub mod scheduler_flows;
