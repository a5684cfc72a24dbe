//! # Work abstractions.
//!
//! This module provides the types a compute fabric runs against slices:
//! - [`Work`] - trait for implementing an async, cancelable work function
//! - [`WorkFn`] - closure-backed work implementation
//! - [`WorkRef`] - shared reference to work (`Arc<dyn Work>`)
//! - [`SliceContext`] - per-invocation context (slice index, cancellation, console)

mod context;
mod work;
mod work_fn;

pub use context::SliceContext;
pub use work::{BoxWorkFuture, Work, WorkRef};
pub use work_fn::WorkFn;
