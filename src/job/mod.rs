//! Jobs: specification, lifecycle and orchestration.
//!
//! - [`JobSpec`] / [`JobSpecBuilder`] describe one unit of work.
//! - [`Job`] owns a compute handle, collects its results and feeds chained jobs.
//! - [`JobState`] is the per-job lifecycle.
//! - [`ResultTree`] is the hierarchical result returned by batch dispatch and
//!   [`Job::result_tree`].

mod chain;
mod job;
mod spec;
mod state;
mod tree;

#[cfg(test)]
mod tests;

pub use job::{Dispatch, Job};
pub use spec::{JobSpec, JobSpecBuilder};
pub use state::JobState;
pub use tree::{ResultTree, Walk};
