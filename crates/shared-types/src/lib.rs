//! # Shared Types Crate
//!
//! Identifiers, job payloads and time abstractions used by every Tidal
//! subsystem.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All cross-crate types are defined here.
//! - **Opaque Identifiers**: Job, node and exchange ids are string newtypes so
//!   the durable store and the binding layer can choose their own formats.
//! - **Injected Time**: Every time-dependent component reads time through a
//!   [`TimeSource`] so tests can drive the clock by hand.

pub mod entities;
pub mod errors;
pub mod operations;
pub mod time;

pub use entities::*;
pub use errors::*;
pub use operations::{InteractionPattern, OperationCatalog, OperationKey};
pub use time::{ManualTimeSource, SystemTimeSource, TimeSource, Timestamp};
