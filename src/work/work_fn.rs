//! # Closure-backed work (`WorkFn`)
//!
//! [`WorkFn`] wraps a closure `F: Fn(Value, Arc<[Value]>, SliceContext) -> Fut`,
//! producing a fresh future per slice. Nothing is shared between invocations
//! unless the closure captures it explicitly (e.g. an `Arc<...>`).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use slicechain::{SliceContext, WorkError, WorkFn, WorkRef};
//!
//! let square: WorkRef = WorkFn::arc("square", |x: Value, _params: Arc<[Value]>, _ctx: SliceContext| async move {
//!     let n = x.as_i64().ok_or_else(|| WorkError::fail("not an integer"))?;
//!     Ok::<_, WorkError>(json!(n * n))
//! });
//!
//! assert_eq!(square.name(), "square");
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::error::WorkError;
use crate::work::SliceContext;
use crate::work::work::{BoxWorkFuture, Work};

/// Closure-backed work implementation.
pub struct WorkFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> WorkFn<F> {
    /// Creates new closure-backed work.
    ///
    /// Prefer [`WorkFn::arc`] when you immediately need a [`WorkRef`](crate::WorkRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the work and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F> fmt::Debug for WorkFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkFn").field("name", &self.name).finish()
    }
}

impl<F, Fut> Work for WorkFn<F>
where
    F: Fn(Value, Arc<[Value]>, SliceContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, WorkError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, slice: Value, params: Arc<[Value]>, ctx: SliceContext) -> BoxWorkFuture {
        Box::pin((self.f)(slice, params, ctx))
    }
}
