//! # Job: the orchestrator.
//!
//! A [`Job`] owns at most one compute handle, an ordered list of chained
//! jobs and the results collected from its handle. It drives the dispatch
//! state machine for its own [`JobSpec`] and feeds its children.
//!
//! ## Batch
//! ```text
//! dispatch()
//!   ├─► acquire handle (submit, groups, auto_close=true, callbacks)
//!   ├─► BatchRunning: execute(); await_completion().await
//!   ├─► Closed
//!   └─► for child in children (attachment order):
//!         child.set_slices(results); child.dispatch().await
//!         (streaming child: finish_input(); result_tree().await)
//!   ─► Dispatch::Finished(ResultTree)
//! ```
//!
//! ## Streaming
//! ```text
//! dispatch()
//!   ├─► acquire handle (auto_close=false)
//!   ├─► StreamingOpen
//!   ├─► dispatch streaming children (each returns immediately)
//!   └─► execute() ─► Dispatch::Streaming
//!
//! on Result(value)            (fabric notification channel)
//!   ├─► results.push(value)
//!   ├─► streaming child.add_slices([value]) for each
//!   └─► close policy met? ─► settle()
//!
//! settle()
//!   ├─► Closed; handle.close()
//!   ├─► streaming child.finish_input()
//!   └─► batch child: set_slices(results); dispatch (spawned)
//! ```
//!
//! ## Streaming close policy
//! A streaming job closes on the first of:
//! - `expected_results` reached;
//! - `finish_input()` called and every submitted slice produced its result;
//! - the handle reports `Complete`;
//! - `close()` or `cancel()`.
//!
//! ## Rules
//! - Parents own children; callbacks hold only a `Weak` to their own job.
//! - The core lock is never held across `.await` nor while calling into
//!   handles or other jobs.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::{FabricError, JobError};
use crate::events::{Callback, EventKind, callback};
use crate::fabric::{FabricRef, HandleId, HandleRef};
use crate::job::{JobSpec, JobState, ResultTree};
use crate::subscribers::Subscribe;

/// What [`Job::dispatch`] produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Batch job: the complete tree of results.
    Finished(ResultTree),
    /// Streaming job: running; use [`Job::result_tree`] once it closes.
    Streaming,
}

impl Dispatch {
    /// The tree, for batch dispatches.
    pub fn into_tree(self) -> Option<ResultTree> {
        match self {
            Dispatch::Finished(tree) => Some(tree),
            Dispatch::Streaming => None,
        }
    }
}

/// Orchestrates one unit of work and its chained jobs.
///
/// Cheap to clone; clones refer to the same job.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

struct JobInner {
    spec: JobSpec,
    fabric: FabricRef,
    core: Mutex<JobCore>,
    /// Written only while `core` is locked.
    state: watch::Sender<JobState>,
}

struct JobCore {
    slices: Vec<Value>,
    handle: Option<HandleRef>,
    results: Vec<Value>,
    children: Vec<Job>,
    /// Slices handed to the handle so far.
    submitted: usize,
    input_finished: bool,
    failure: Option<JobError>,
}

impl Job {
    /// Creates a root job. No fabric resources are acquired until dispatch.
    ///
    /// Fails with [`JobError::InvalidSpec`] when the name is empty or work is missing.
    pub fn new(spec: JobSpec, fabric: FabricRef) -> Result<Self, JobError> {
        spec.validate()?;
        Ok(Self::unchecked(spec, fabric))
    }

    pub(crate) fn unchecked(spec: JobSpec, fabric: FabricRef) -> Self {
        let (state, _) = watch::channel(JobState::Created);
        let slices = spec.slices().to_vec();
        Self {
            inner: Arc::new(JobInner {
                spec,
                fabric,
                core: Mutex::new(JobCore {
                    slices,
                    handle: None,
                    results: Vec::new(),
                    children: Vec::new(),
                    submitted: 0,
                    input_finished: false,
                    failure: None,
                }),
                state,
            }),
        }
    }

    pub(crate) fn fabric(&self) -> &FabricRef {
        &self.inner.fabric
    }

    fn lock(&self) -> MutexGuard<'_, JobCore> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes `state`. Takes the core guard so every transition happens under the lock.
    fn set_state(&self, _core: &mut JobCore, state: JobState) {
        let prev = self.inner.state.send_replace(state);
        tracing::debug!(job = self.name(), from = %prev, to = %state, "job state");
    }

    pub fn name(&self) -> &str {
        self.inner.spec.name()
    }

    pub fn spec(&self) -> &JobSpec {
        &self.inner.spec
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.spec.is_streaming()
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.borrow()
    }

    /// Identifier of the compute handle; fails before dispatch.
    pub fn id(&self) -> Result<HandleId, JobError> {
        self.lock()
            .handle
            .as_ref()
            .map(|h| h.id())
            .ok_or_else(|| self.not_initialized())
    }

    /// Snapshot of the results collected so far, in delivery order.
    pub fn results(&self) -> Vec<Value> {
        self.lock().results.clone()
    }

    /// Chained jobs in attachment order.
    pub fn children(&self) -> Vec<Job> {
        self.lock().children.clone()
    }

    pub(crate) fn attach(&self, child: &Job) -> bool {
        let mut core = self.lock();
        if self.state() == JobState::Created {
            core.children.push(child.clone());
            true
        } else {
            false
        }
    }

    /// Replaces the default slices. Only valid before dispatch.
    pub fn set_slices(&self, slices: Vec<Value>) -> Result<(), JobError> {
        let mut core = self.lock();
        match self.state() {
            JobState::Created => {
                core.slices = slices;
                Ok(())
            }
            JobState::Closed => Err(self.closed()),
            _ => Err(self.already_dispatched()),
        }
    }

    /// Registers `cb` for `kind` on the live handle.
    ///
    /// Fails with [`JobError::NotInitialized`] before dispatch and
    /// [`JobError::Closed`] after close. Use [`JobSpecBuilder::on`](crate::JobSpecBuilder::on) to subscribe
    /// before the handle exists.
    pub fn subscribe(&self, kind: EventKind, cb: Callback) -> Result<(), JobError> {
        let handle = {
            let core = self.lock();
            if self.state().is_closed() {
                return Err(self.closed());
            }
            core.handle.clone().ok_or_else(|| self.not_initialized())?
        };
        handle.on(kind, cb);
        Ok(())
    }

    /// Registers `sub` on the live handle for every kind it declares.
    pub fn subscribe_with(&self, sub: Arc<dyn Subscribe>) -> Result<(), JobError> {
        for kind in sub.kinds() {
            let s = Arc::clone(&sub);
            self.subscribe(*kind, callback(move |ev| s.on_event(ev)))?;
        }
        Ok(())
    }

    /// Acquires the handle and runs the job according to its spec.
    ///
    /// Batch jobs return once the whole chain below them finished. Streaming
    /// jobs return as soon as they are executing.
    pub async fn dispatch(&self) -> Result<Dispatch, JobError> {
        let handle = self.acquire().await?;
        if self.is_streaming() {
            self.run_streaming(handle).await
        } else {
            self.run_batch(handle).await
        }
    }

    /// Boxed `'static` variant of [`Job::dispatch`] for recursion and spawning.
    pub(crate) fn dispatch_boxed(&self) -> BoxFuture<'static, Result<Dispatch, JobError>> {
        let job = self.clone();
        async move { job.dispatch().await }.boxed()
    }

    /// Schedules more slices on a streaming job.
    pub fn add_slices(&self, slices: Vec<Value>) -> Result<(), JobError> {
        if !self.is_streaming() {
            return Err(JobError::NotStreaming {
                job: self.name().to_owned(),
            });
        }
        let n = slices.len();
        let handle = {
            let mut core = self.lock();
            match self.state() {
                JobState::StreamingOpen if core.input_finished => return Err(self.closed()),
                JobState::StreamingOpen => {}
                JobState::Closed => return Err(self.closed()),
                _ => return Err(self.not_initialized()),
            }
            let handle = core.handle.clone().ok_or_else(|| self.not_initialized())?;
            core.submitted += n;
            handle
        };

        if let Err(err) = handle.add_slices(slices) {
            self.lock().submitted -= n;
            return Err(err.into());
        }
        tracing::debug!(job = self.name(), slices = n, "slices added");
        Ok(())
    }

    /// Declares that no more slices will be added to this streaming job.
    ///
    /// The job closes once every submitted slice produced its result.
    pub fn finish_input(&self) -> Result<(), JobError> {
        if !self.is_streaming() {
            return Err(JobError::NotStreaming {
                job: self.name().to_owned(),
            });
        }
        let drained = {
            let mut core = self.lock();
            if self.state().is_closed() {
                return Err(self.closed());
            }
            core.input_finished = true;
            self.state() == JobState::StreamingOpen && self.drained(&core)
        };
        if drained {
            self.settle(None);
        }
        Ok(())
    }

    /// Closes a streaming job now, without waiting for in-flight slices.
    ///
    /// Children are finalized as if the job had drained. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), JobError> {
        if !self.is_streaming() {
            return Err(JobError::NotStreaming {
                job: self.name().to_owned(),
            });
        }
        match self.state() {
            JobState::Closed => Ok(()),
            JobState::StreamingOpen => {
                self.settle(None);
                Ok(())
            }
            _ => Err(self.not_initialized()),
        }
    }

    /// Releases the handle, closes this job and cancels every chained job.
    pub fn cancel(&self) {
        let pending = {
            let core = self.lock();
            core.submitted.saturating_sub(core.results.len())
        };
        self.settle(Some(FabricError::Cancelled { pending }.into()));
    }

    /// Waits for this job and all chained jobs to close, then assembles their results.
    ///
    /// Returns the first recorded failure instead, if any.
    pub async fn result_tree(&self) -> Result<ResultTree, JobError> {
        let mut rx = self.inner.state.subscribe();
        let settled = rx.wait_for(JobState::is_closed).await.is_ok();
        if !settled {
            return Err(self.closed());
        }

        let (results, children) = {
            let core = self.lock();
            if let Some(err) = &core.failure {
                return Err(err.clone());
            }
            (core.results.clone(), core.children.clone())
        };

        let mut chains = Vec::with_capacity(children.len());
        for child in children {
            chains.push(child.result_tree_boxed().await?);
        }
        Ok(ResultTree::new(self.name(), results, chains))
    }

    fn result_tree_boxed(&self) -> BoxFuture<'static, Result<ResultTree, JobError>> {
        let job = self.clone();
        async move { job.result_tree().await }.boxed()
    }

    /// `Created → Dispatched`, submit, configure, register callbacks.
    async fn acquire(&self) -> Result<HandleRef, JobError> {
        let spec = &self.inner.spec;
        let slices = {
            let mut core = self.lock();
            match self.state() {
                JobState::Created => {}
                JobState::Closed => return Err(self.closed()),
                _ => return Err(self.already_dispatched()),
            }
            self.set_state(&mut core, JobState::Dispatched);
            std::mem::take(&mut core.slices)
        };

        let work = match (spec.validate(), spec.work()) {
            (Ok(()), Some(work)) => Arc::clone(work),
            (Err(err), _) => return Err(self.fail(err)),
            (Ok(()), None) => {
                return Err(self.fail(JobError::InvalidSpec {
                    reason: "missing work function".into(),
                }));
            }
        };

        let count = slices.len();
        let handle = match self
            .inner
            .fabric
            .submit(slices, work, spec.constant_params().to_vec())
            .await
        {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(err.into())),
        };

        handle.set_compute_groups(spec.compute_groups().clone());
        handle.set_auto_close(!spec.is_streaming());
        self.register_internal(&handle);
        for (kind, cb) in spec.subscriptions() {
            handle.on(*kind, Arc::clone(cb));
        }

        {
            let mut core = self.lock();
            if self.state().is_closed() {
                drop(core);
                handle.close();
                return Err(self.closed());
            }
            core.handle = Some(Arc::clone(&handle));
            core.submitted = count;
        }

        tracing::info!(
            job = self.name(),
            handle = %handle.id(),
            slices = count,
            stream = spec.is_streaming(),
            "job dispatched"
        );
        Ok(handle)
    }

    /// The result collector goes first so user callbacks observe it populated.
    fn register_internal(&self, handle: &HandleRef) {
        let weak: Weak<JobInner> = Arc::downgrade(&self.inner);
        handle.on(
            EventKind::Result,
            callback(move |ev| {
                if let (Some(inner), Some(value)) = (weak.upgrade(), ev.result()) {
                    Job { inner }.on_result(value.clone());
                }
            }),
        );

        let weak: Weak<JobInner> = Arc::downgrade(&self.inner);
        handle.on(
            EventKind::Complete,
            callback(move |ev| {
                if let (Some(inner), Some(outcome)) = (weak.upgrade(), ev.outcome()) {
                    Job { inner }.on_complete(outcome);
                }
            }),
        );
    }

    async fn run_batch(&self, handle: HandleRef) -> Result<Dispatch, JobError> {
        self.enter(JobState::BatchRunning)?;
        if let Err(err) = handle.execute() {
            return Err(self.fail(err.into()));
        }

        let results = match handle.await_completion().await {
            Ok(results) => results,
            Err(err) => return Err(self.fail(err.into())),
        };

        let children = {
            let mut core = self.lock();
            if self.state().is_closed() {
                return Err(core.failure.clone().unwrap_or_else(|| self.closed()));
            }
            core.results = results.clone();
            self.set_state(&mut core, JobState::Closed);
            core.children.clone()
        };
        tracing::info!(job = self.name(), results = results.len(), "job closed");

        let mut chains = Vec::with_capacity(children.len());
        for child in children {
            child.set_slices(results.clone())?;
            let tree = match child.dispatch_boxed().await? {
                Dispatch::Finished(tree) => tree,
                Dispatch::Streaming => {
                    // The child may already have closed on its own (expected results, fabric completion).
                    match child.finish_input() {
                        Ok(()) | Err(JobError::Closed { .. }) => {}
                        Err(err) => return Err(err),
                    }
                    child.result_tree_boxed().await?
                }
            };
            chains.push(tree);
        }
        Ok(Dispatch::Finished(ResultTree::new(
            self.name(),
            results,
            chains,
        )))
    }

    async fn run_streaming(&self, handle: HandleRef) -> Result<Dispatch, JobError> {
        self.enter(JobState::StreamingOpen)?;

        for child in self.children().into_iter().filter(Job::is_streaming) {
            if let Err(err) = child.dispatch_boxed().await {
                self.cancel();
                return Err(err);
            }
        }

        if let Err(err) = handle.execute() {
            return Err(self.fail(err.into()));
        }

        let drained = {
            let core = self.lock();
            self.state() == JobState::StreamingOpen && self.drained(&core)
        };
        if drained {
            self.settle(None);
        }
        Ok(Dispatch::Streaming)
    }

    /// `Dispatched → next`, unless a concurrent cancel already closed the job.
    fn enter(&self, next: JobState) -> Result<(), JobError> {
        let mut core = self.lock();
        if self.state() != JobState::Dispatched {
            return Err(core.failure.clone().unwrap_or_else(|| self.closed()));
        }
        self.set_state(&mut core, next);
        Ok(())
    }

    fn on_result(&self, value: Value) {
        let (forward, drained) = {
            let mut core = self.lock();
            if self.state().is_closed() {
                return;
            }
            core.results.push(value.clone());
            if !self.is_streaming() {
                return;
            }
            let forward: Vec<Job> = core
                .children
                .iter()
                .filter(|c| c.is_streaming())
                .cloned()
                .collect();
            (forward, self.drained(&core))
        };

        for child in forward {
            if let Err(err) = child.add_slices(vec![value.clone()]) {
                tracing::warn!(
                    job = self.name(),
                    child = child.name(),
                    err = %err,
                    label = err.as_label(),
                    "child refused forwarded result"
                );
            }
        }
        if drained {
            self.settle(None);
        }
    }

    fn on_complete(&self, outcome: &Result<usize, FabricError>) {
        if !self.is_streaming() {
            return;
        }
        match outcome {
            Ok(_) => self.settle(None),
            Err(err) => self.settle(Some(err.clone().into())),
        }
    }

    fn drained(&self, core: &JobCore) -> bool {
        let collected = core.results.len();
        self.inner
            .spec
            .expected_results()
            .is_some_and(|n| collected >= n)
            || (core.input_finished && collected >= core.submitted)
    }

    /// Records `err`, closes the job and cancels its children. Returns `err`.
    fn fail(&self, err: JobError) -> JobError {
        tracing::warn!(job = self.name(), err = %err, label = err.as_label(), "job failed");
        self.settle(Some(err.clone()));
        err
    }

    /// Moves the job to `Closed` once and finalizes its children.
    fn settle(&self, failure: Option<JobError>) {
        let (handle, children, results) = {
            let mut core = self.lock();
            if self.state().is_closed() {
                return;
            }
            core.failure = failure.clone();
            self.set_state(&mut core, JobState::Closed);
            (
                core.handle.clone(),
                core.children.clone(),
                core.results.clone(),
            )
        };
        if let Some(handle) = handle {
            handle.close();
        }

        if failure.is_some() {
            for child in children {
                child.cancel();
            }
            return;
        }

        tracing::info!(job = self.name(), results = results.len(), "job closed");
        for child in children {
            if child.is_streaming() {
                match child.finish_input() {
                    Ok(()) | Err(JobError::Closed { .. }) => {}
                    Err(err) => {
                        tracing::warn!(job = child.name(), err = %err, "could not finish child input")
                    }
                }
                continue;
            }
            if let Err(err) = child.set_slices(results.clone()) {
                tracing::warn!(job = child.name(), err = %err, "chained job not dispatched");
                continue;
            }
            let Ok(rt) = tokio::runtime::Handle::try_current() else {
                tracing::warn!(job = child.name(), "no tokio runtime; chained job not dispatched");
                child.cancel();
                continue;
            };
            rt.spawn(async move {
                if let Err(err) = child.dispatch_boxed().await {
                    tracing::warn!(job = child.name(), err = %err, label = err.as_label(), "chained job failed");
                }
            });
        }
    }

    fn not_initialized(&self) -> JobError {
        JobError::NotInitialized {
            job: self.name().to_owned(),
        }
    }

    fn closed(&self) -> JobError {
        JobError::Closed {
            job: self.name().to_owned(),
        }
    }

    fn already_dispatched(&self) -> JobError {
        JobError::AlreadyDispatched {
            job: self.name().to_owned(),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("stream", &self.is_streaming())
            .finish()
    }
}
