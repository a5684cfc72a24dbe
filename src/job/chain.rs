//! Chaining: attaching downstream jobs that consume a job's results.

use std::sync::Arc;

use crate::job::{Job, JobSpec};

impl Job {
    /// Creates a job from `spec` that consumes this job's results.
    ///
    /// The new job shares this job's fabric and is returned so chains can be
    /// built fluently:
    ///
    /// ```rust
    /// # use std::sync::Arc;
    /// # use serde_json::{json, Value};
    /// # use slicechain::{Job, JobSpec, LocalFabric, SliceContext, WorkError, WorkFn};
    /// # let fabric = Arc::new(LocalFabric::default());
    /// # let id = WorkFn::arc("id", |x: Value, _p: Arc<[Value]>, _c: SliceContext| async move { Ok::<_, WorkError>(x) });
    /// let root = Job::new(JobSpec::builder("square").with_work(id.clone()).build(), fabric)?;
    /// let negate = root.chain(JobSpec::builder("negate").with_work(id.clone()).build());
    /// let _abs = negate.chain(JobSpec::builder("abs").with_work(id).build());
    /// assert_eq!(root.children().len(), 1);
    /// # Ok::<(), slicechain::JobError>(())
    /// ```
    ///
    /// ### Rules
    /// - Children are fed in attachment order.
    /// - A batch child receives every result at once, after this job closes.
    /// - A streaming child receives each result as it arrives, when this job
    ///   streams too. Under a batch parent it receives all results at once and
    ///   closes after draining them.
    /// - The child's spec is validated when it is dispatched, not here.
    /// - Chaining after dispatch is not supported: the child is returned
    ///   detached and never fed.
    pub fn chain(&self, spec: JobSpec) -> Job {
        let child = Job::unchecked(spec, Arc::clone(self.fabric()));
        if !self.attach(&child) {
            tracing::warn!(
                job = self.name(),
                child = child.name(),
                state = %self.state(),
                "chain after dispatch ignored; child is detached"
            );
        }
        child
    }
}
