//! # Work abstraction.
//!
//! The [`Work`] trait is what a compute fabric executes for every slice. The
//! orchestrator never calls it; it only hands a [`WorkRef`] to
//! [`ComputeFabric::submit`](crate::ComputeFabric::submit).
//!
//! A work function receives the slice value, the job's constant parameters and
//! a [`SliceContext`]. It should check [`SliceContext::is_cancelled`] during
//! long computations and return [`WorkError::Canceled`] when it gives up.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::WorkError;
use crate::work::SliceContext;

/// Boxed future returned by [`Work::run`].
pub type BoxWorkFuture = BoxFuture<'static, Result<Value, WorkError>>;

/// Shared handle to a work function.
pub type WorkRef = Arc<dyn Work>;

/// # Asynchronous work applied to one slice.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use serde_json::{json, Value};
/// use slicechain::{BoxWorkFuture, SliceContext, Work, WorkError};
///
/// struct Double;
///
/// impl Work for Double {
///     fn name(&self) -> &str { "double" }
///
///     fn run(&self, slice: Value, _params: Arc<[Value]>, _ctx: SliceContext) -> BoxWorkFuture {
///         Box::pin(async move {
///             let n = slice.as_i64().ok_or_else(|| WorkError::fail("not an integer"))?;
///             Ok::<_, WorkError>(json!(n * 2))
///         })
///     }
/// }
/// ```
pub trait Work: Send + Sync + 'static {
    /// Returns a stable, human-readable name used in logs.
    fn name(&self) -> &str;

    /// Creates a fresh future computing the output for `slice`.
    fn run(&self, slice: Value, params: Arc<[Value]>, ctx: SliceContext) -> BoxWorkFuture;
}
