//! # Job specification.
//!
//! Defines [`JobSpec`], the immutable description of one unit of work, and
//! its fluent [`JobSpecBuilder`].
//!
//! ## Rules
//! - Building never fails. Validation (non-empty name, work present) happens
//!   in [`Job::new`](crate::Job::new) for roots and at dispatch for chained jobs.
//! - `slices` are a default; [`Job::set_slices`](crate::Job::set_slices)
//!   overrides them before dispatch, and chained jobs receive theirs from the parent.
//! - Subscriptions keep insertion order and are registered after the job's
//!   internal result collector.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{FabricError, JobError};
use crate::events::{Callback, EventKind, callback};
use crate::fabric::ComputeGroup;
use crate::subscribers::Subscribe;
use crate::work::WorkRef;

/// Description of one unit of work.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use serde_json::{json, Value};
/// use slicechain::{ComputeGroup, JobSpec, SliceContext, WorkError, WorkFn};
///
/// let spec = JobSpec::builder("scale")
///     .with_work(WorkFn::arc("scale", |x: Value, p: Arc<[Value]>, _ctx: SliceContext| async move {
///         let factor = p.first().and_then(Value::as_i64).unwrap_or(1);
///         Ok::<_, WorkError>(json!(x.as_i64().unwrap_or(0) * factor))
///     }))
///     .with_slices([json!(1), json!(2), json!(3)])
///     .with_params([json!(3)])
///     .with_compute_group(ComputeGroup::new("sheridan", "dcp"))
///     .on_result(|v| println!("result: {v}"))
///     .build();
///
/// assert_eq!(spec.name(), "scale");
/// assert!(!spec.is_streaming());
/// ```
#[derive(Clone)]
pub struct JobSpec {
    name: String,
    work: Option<WorkRef>,
    constant_params: Vec<Value>,
    slices: Vec<Value>,
    stream: bool,
    compute_groups: BTreeSet<ComputeGroup>,
    subscriptions: Vec<(EventKind, Callback)>,
    expected_results: Option<usize>,
}

impl JobSpec {
    /// Creates a builder for a job called `name`.
    pub fn builder(name: impl Into<String>) -> JobSpecBuilder {
        JobSpecBuilder::new(name)
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Work function, if set.
    pub fn work(&self) -> Option<&WorkRef> {
        self.work.as_ref()
    }

    /// Parameters passed unchanged to every slice.
    pub fn constant_params(&self) -> &[Value] {
        &self.constant_params
    }

    /// Default input slices.
    pub fn slices(&self) -> &[Value] {
        &self.slices
    }

    /// Whether the job dispatches in streaming mode.
    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    /// Compute groups handed to the fabric.
    pub fn compute_groups(&self) -> &BTreeSet<ComputeGroup> {
        &self.compute_groups
    }

    /// User subscriptions in registration order.
    pub fn subscriptions(&self) -> &[(EventKind, Callback)] {
        &self.subscriptions
    }

    /// Results after which a streaming job closes on its own.
    pub fn expected_results(&self) -> Option<usize> {
        self.expected_results
    }

    /// Checks the fields a job cannot run without.
    pub(crate) fn validate(&self) -> Result<(), JobError> {
        if self.name.trim().is_empty() {
            return Err(JobError::InvalidSpec {
                reason: "name must not be empty".into(),
            });
        }
        if self.work.is_none() {
            return Err(JobError::InvalidSpec {
                reason: format!("job '{}' has no work function", self.name),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("work", &self.work.as_ref().map(|w| w.name().to_owned()))
            .field("constant_params", &self.constant_params)
            .field("slices", &self.slices.len())
            .field("stream", &self.stream)
            .field("compute_groups", &self.compute_groups)
            .field("subscriptions", &self.subscriptions.len())
            .field("expected_results", &self.expected_results)
            .finish()
    }
}

/// Builder for [`JobSpec`] with fluent API.
#[derive(Clone)]
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    /// Creates a builder with the given job name and no work.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            spec: JobSpec {
                name: name.into(),
                work: None,
                constant_params: Vec::new(),
                slices: Vec::new(),
                stream: false,
                compute_groups: BTreeSet::new(),
                subscriptions: Vec::new(),
                expected_results: None,
            },
        }
    }

    pub fn with_work(mut self, work: WorkRef) -> Self {
        self.spec.work = Some(work);
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = Value>) -> Self {
        self.spec.constant_params = params.into_iter().collect();
        self
    }

    pub fn with_slices(mut self, slices: impl IntoIterator<Item = Value>) -> Self {
        self.spec.slices = slices.into_iter().collect();
        self
    }

    /// Selects streaming dispatch (`true`) or batch dispatch (`false`, default).
    pub fn streaming(mut self, stream: bool) -> Self {
        self.spec.stream = stream;
        self
    }

    pub fn with_compute_group(mut self, group: ComputeGroup) -> Self {
        self.spec.compute_groups.insert(group);
        self
    }

    pub fn with_compute_groups(mut self, groups: impl IntoIterator<Item = ComputeGroup>) -> Self {
        self.spec.compute_groups.extend(groups);
        self
    }

    /// Closes a streaming job once `n` results were collected.
    pub fn with_expected_results(mut self, n: usize) -> Self {
        self.spec.expected_results = Some(n);
        self
    }

    /// Registers a raw callback for `kind`.
    pub fn on(mut self, kind: EventKind, cb: Callback) -> Self {
        self.spec.subscriptions.push((kind, cb));
        self
    }

    /// Registers a callback receiving each produced value.
    pub fn on_result<F>(self, f: F) -> Self
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on(
            EventKind::Result,
            callback(move |ev| {
                if let Some(v) = ev.result() {
                    f(v)
                }
            }),
        )
    }

    /// Registers a callback receiving the handle's final outcome.
    pub fn on_complete<F>(self, f: F) -> Self
    where
        F: Fn(&Result<usize, FabricError>) + Send + Sync + 'static,
    {
        self.on(
            EventKind::Complete,
            callback(move |ev| {
                if let Some(outcome) = ev.outcome() {
                    f(outcome)
                }
            }),
        )
    }

    /// Registers a callback receiving console lines written by work functions.
    pub fn on_console<F>(self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(
            EventKind::Console,
            callback(move |ev| {
                if let Some(line) = ev.console() {
                    f(line)
                }
            }),
        )
    }

    /// Registers `sub` for every kind it declares.
    pub fn with_subscriber(mut self, sub: Arc<dyn Subscribe>) -> Self {
        for kind in sub.kinds() {
            let s = Arc::clone(&sub);
            self.spec
                .subscriptions
                .push((*kind, callback(move |ev| s.on_event(ev))));
        }
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}
