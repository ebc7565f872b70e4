//! Ports layer for the transaction subsystem.
//!
//! Only driven (outbound) ports live here: the transaction SPI of the
//! underlying durable store.

pub mod outbound;

pub use outbound::*;
