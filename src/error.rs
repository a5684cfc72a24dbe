//! Error types used by the orchestrator, the compute fabric and work functions.
//!
//! This module defines three error enums:
//!
//! - [`JobError`] for precondition violations raised by [`Job`](crate::Job) operations.
//! - [`FabricError`] for failures reported by a [`ComputeFabric`](crate::ComputeFabric) or its handles.
//! - [`WorkError`] for failures returned by a single work-function invocation.
//!
//! All types provide `as_label` for logging. Fabric errors travel through
//! [`JobError::Fabric`] unchanged; the orchestrator never retries them.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by job orchestration.
///
/// Everything except [`JobError::Fabric`] is a synchronous precondition failure
/// raised at the call that violated it.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    /// A required [`JobSpec`](crate::JobSpec) field is missing or empty.
    #[error("invalid job spec: {reason}")]
    InvalidSpec {
        /// What is wrong with the job spec.
        reason: String,
    },

    /// The operation needs a live compute handle, which is acquired at dispatch.
    #[error("job '{job}' has no compute handle yet")]
    NotInitialized {
        /// Job name.
        job: String,
    },

    /// Slice injection was attempted on a job built without `stream`.
    #[error("job '{job}' is not configured to stream slices")]
    NotStreaming {
        /// Job name.
        job: String,
    },

    /// A mutating operation was attempted after the job closed.
    #[error("job '{job}' is closed")]
    Closed {
        /// Job name.
        job: String,
    },

    /// The job was already dispatched; a job owns at most one handle.
    #[error("job '{job}' was already dispatched")]
    AlreadyDispatched {
        /// Job name.
        job: String,
    },

    /// Failure reported by the compute fabric, passed through as is.
    #[error(transparent)]
    Fabric(#[from] FabricError),
}

impl JobError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use slicechain::JobError;
    ///
    /// let err = JobError::NotStreaming { job: "render".into() };
    /// assert_eq!(err.as_label(), "job_not_streaming");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::InvalidSpec { .. } => "job_invalid_spec",
            JobError::NotInitialized { .. } => "job_not_initialized",
            JobError::NotStreaming { .. } => "job_not_streaming",
            JobError::Closed { .. } => "job_closed",
            JobError::AlreadyDispatched { .. } => "job_already_dispatched",
            JobError::Fabric(e) => e.as_label(),
        }
    }
}

/// # Errors produced by a compute fabric.
///
/// Retry and backoff policy belongs to the fabric. Once one of these reaches
/// the orchestrator it is final for the handle that reported it.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FabricError {
    /// A slice's work function returned an error.
    #[error("slice {slice} failed: {error}")]
    SliceFailed {
        /// Zero-based index of the slice within its handle.
        slice: usize,
        /// The underlying error message.
        error: String,
    },

    /// A slice exceeded the fabric's per-slice timeout.
    #[error("slice {slice} timed out after {timeout:?}")]
    SliceTimeout {
        /// Zero-based index of the slice within its handle.
        slice: usize,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The handle was closed while slices were still in flight.
    #[error("handle closed with {pending} slice(s) still in flight")]
    Cancelled {
        /// Slices that never produced a result.
        pending: usize,
    },

    /// `add_slices` on a handle whose auto-close flag is set.
    #[error("handle auto-closes; slices cannot be added")]
    AutoClose,

    /// The handle is already closed.
    #[error("handle is closed")]
    Closed,

    /// Completion was awaited on a handle that was never executed.
    #[error("handle is not executing")]
    NotExecuting,

    /// The fabric refused the submission.
    #[error("submit rejected: {reason}")]
    Submit {
        /// Fabric-supplied reason.
        reason: String,
    },
}

impl FabricError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            FabricError::SliceFailed { .. } => "fabric_slice_failed",
            FabricError::SliceTimeout { .. } => "fabric_slice_timeout",
            FabricError::Cancelled { .. } => "fabric_cancelled",
            FabricError::AutoClose => "fabric_auto_close",
            FabricError::Closed => "fabric_closed",
            FabricError::NotExecuting => "fabric_not_executing",
            FabricError::Submit { .. } => "fabric_submit_rejected",
        }
    }
}

/// # Errors produced by one work-function invocation.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkError {
    /// The work function could not produce a result for its slice.
    #[error("work failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The work function observed cancellation and gave up.
    #[error("work cancelled")]
    Canceled,
}

impl WorkError {
    /// Convenience constructor for [`WorkError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        WorkError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            WorkError::Fail { .. } => "work_failed",
            WorkError::Canceled => "work_canceled",
        }
    }
}
