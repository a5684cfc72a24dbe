//! Job lifecycle states.
//!
//! ```text
//! Created ──dispatch()──► Dispatched ──┬─► BatchRunning ──completion──┐
//!                                      └─► StreamingOpen ──close──────┴─► Closed
//! ```
//! `cancel()` moves any state straight to `Closed`.

use std::fmt;

/// Where a [`Job`](crate::Job) is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Built; no compute handle yet.
    Created,
    /// Handle being acquired and configured.
    Dispatched,
    /// Batch handle executing; `dispatch()` is waiting for completion.
    BatchRunning,
    /// Streaming handle executing; accepts `add_slices`.
    StreamingOpen,
    /// Terminal.
    Closed,
}

impl JobState {
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self, JobState::Closed)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Dispatched => "dispatched",
            JobState::BatchRunning => "batch_running",
            JobState::StreamingOpen => "streaming_open",
            JobState::Closed => "closed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
