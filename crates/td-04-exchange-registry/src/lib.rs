//! # Message Exchange Registry
//!
//! Tracks every live request/response conversation between a process
//! instance and its partners, and the resource routes instances listen on.
//!
//! ## Exchange Lifecycle
//!
//! ```text
//!  create(tx) ──→ NEW ──→ INVOKED ──→ ASYNC_WAIT ──┬──→ COMPLETED_OK
//!      │                                           ├──→ COMPLETED_FAULT
//!      │                                           └──→ FAILED
//!      │
//!      ├── tx rolls back ──────────→ removed (any status)
//!      ├── age > TTL, unfinished ──→ evicted by the sweep
//!      └── age > TTL, finished ────→ released by the sweep
//! ```
//!
//! ## Sweep
//!
//! | Setting              | Default   |
//! |----------------------|-----------|
//! | TTL                  | 2 minutes |
//! | Minimum interval     | TTL / 4   |
//!
//! Creation order is kept in a separate index so the sweep stops at the first
//! entry that is still young. Eviction and completion race on a single atomic
//! status word per exchange; exactly one of them wins.

pub mod config;
pub mod domain;
pub mod error;
pub mod registry;

pub use config::{RegistryConfig, DEFAULT_EXCHANGE_TTL};
pub use domain::{
    AckType, Completion, CorrelationStatus, Direction, ExchangeSnapshot, ExchangeStatus,
    FailureType, InvocationStyle, MessageExchange, ResourceRoute, RouteKey, RouteTable,
};
pub use error::{RegistryError, RegistryResult};
pub use registry::{MessageExchangeRegistry, RegistryStats, SweepReport};
