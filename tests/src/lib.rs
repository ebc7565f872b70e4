//! # Tidal Test Suite
//!
//! Unified test crate for flows that cross subsystem boundaries.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── claim_race.rs        # N nodes racing for one job
//!     ├── exchange_flows.rs    # registry under real transactions
//!     ├── scheduler_flows.rs   # timers and timeout overrides
//!     └── scenarios.rs         # multi-node end-to-end stories
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p td-tests
//!
//! # By file
//! cargo test -p td-tests integration::scenarios::
//! ```

pub mod integration;
