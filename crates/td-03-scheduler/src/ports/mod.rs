//! Ports layer for the scheduler.
//!
//! - `processor`: the application callback the scheduler drives
//! - `coordinator`: coordinator election and the lease table behind it

pub mod coordinator;
pub mod processor;

pub use coordinator::{CoordinatorElection, LeaseTable};
pub use processor::{JobHandler, JobInfo, JobProcessor};
