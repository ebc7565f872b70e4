//! Domain layer for the scheduler.
//!
//! - `todo`: in-memory time-ordered queue of due work
//! - `cluster`: heartbeat view of the other nodes

pub mod cluster;
pub mod todo;

pub use cluster::ClusterView;
pub use todo::{ScheduledJob, Task, TodoQueue};
