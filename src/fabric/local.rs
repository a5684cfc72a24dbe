//! # LocalFabric: in-process reference fabric.
//!
//! Runs work functions on the tokio runtime. Every handle owns one
//! notification queue drained by a single driver task, so callbacks for a
//! handle never run concurrently and observe events in delivery order.
//!
//! ## Architecture
//! ```text
//! execute() / add_slices()
//!     └─► schedule(slices) ── spawn per slice ──► [permit] ─► work.run() ─► Notice::Result / Failed
//!                                                                            │
//!                                         mpsc (notification queue)  ◄───────┘
//!                                                     │
//!                                               driver task
//!                                                     ├─► tally results
//!                                                     ├─► EventRelay::emit(Result, Status, ...)
//!                                                     └─► settle: Complete + release when done
//! ```
//!
//! ## Rules
//! - Auto-close on: `Complete(Ok)` fires once every scheduled slice has a result.
//! - Auto-close off: `Complete(Ok)` fires when `close()` arrives with nothing in flight;
//!   closing with slices in flight cancels them and resolves with `Cancelled`.
//! - A failed, panicked or timed-out slice cancels the rest and resolves the handle with that error.
//! - `ReadyStateChange(Submitted)` is queued at submission and delivered when the driver starts.
//! - `close()` releases exactly once.

use std::any::Any;
use std::collections::BTreeSet;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::FabricConfig;
use crate::error::{FabricError, WorkError};
use crate::events::{Callback, Event, EventKind, EventPayload, EventRelay, ReadyState};
use crate::fabric::{ComputeFabric, ComputeGroup, ComputeHandle, HandleId, HandleRef};
use crate::work::{SliceContext, WorkRef};

type Outcome = Option<Result<Vec<Value>, FabricError>>;

/// In-process compute fabric.
///
/// ## Example
/// ```rust
/// use std::sync::Arc;
/// use serde_json::{json, Value};
/// use slicechain::{ComputeHandle, FabricConfig, LocalFabric, SliceContext, WorkError, WorkFn};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let fabric = LocalFabric::new(FabricConfig::default());
///     let double = WorkFn::arc("double", |x: Value, _p: Arc<[Value]>, _ctx: SliceContext| async move {
///         Ok::<_, WorkError>(json!(x.as_i64().unwrap_or(0) * 2))
///     });
///
///     let handle = fabric.open(vec![json!(1), json!(2)], double, vec![]);
///     handle.execute()?;
///     let mut out = handle.await_completion().await?;
///     out.sort_by_key(|v| v.as_i64());
///     assert_eq!(out, vec![json!(2), json!(4)]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct LocalFabric {
    cfg: FabricConfig,
    semaphore: Option<Arc<Semaphore>>,
}

impl LocalFabric {
    /// Creates a fabric; `cfg.max_concurrent` applies across all its handles.
    pub fn new(cfg: FabricConfig) -> Self {
        let semaphore = cfg.concurrency_limit().map(Semaphore::new).map(Arc::new);
        Self { cfg, semaphore }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FabricConfig {
        &self.cfg
    }

    /// Creates a handle without going through the trait object.
    ///
    /// Auto-close defaults to `true`, as for a freshly submitted batch.
    pub fn open(&self, slices: Vec<Value>, work: WorkRef, constant_params: Vec<Value>) -> Arc<LocalHandle> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(None);
        let id = HandleId::new();

        tracing::debug!(handle = %id, work = work.name(), slices = slices.len(), "handle submitted");
        // Delivered once the driver starts, after callbacks were registered.
        let _ = tx.send(Notice::Emit(EventPayload::ReadyStateChange(ReadyState::Submitted)));

        Arc::new(LocalHandle {
            shared: Arc::new(Shared {
                id,
                work,
                params: Arc::from(constant_params),
                relay: EventRelay::new(),
                semaphore: self.semaphore.clone(),
                timeout: self.cfg.slice_timeout(),
                token: CancellationToken::new(),
                tx,
                state: Mutex::new(HandleState {
                    queued: slices,
                    groups: BTreeSet::new(),
                    auto_close: true,
                    executing: false,
                    next_slice: 0,
                    rx: Some(rx),
                }),
                done,
                closed: AtomicBool::new(false),
                releases: AtomicUsize::new(0),
            }),
        })
    }
}

impl Default for LocalFabric {
    fn default() -> Self {
        Self::new(FabricConfig::default())
    }
}

#[async_trait]
impl ComputeFabric for LocalFabric {
    async fn submit(
        &self,
        slices: Vec<Value>,
        work: WorkRef,
        constant_params: Vec<Value>,
    ) -> Result<HandleRef, FabricError> {
        Ok(self.open(slices, work, constant_params))
    }
}

/// Messages drained by a handle's driver task.
enum Notice {
    Emit(EventPayload),
    Scheduled(usize),
    Result { slice: usize, value: Value },
    Console { slice: usize, message: String },
    Failed(FabricError),
    Check,
    Closed,
}

struct HandleState {
    /// Slices waiting for `execute`.
    queued: Vec<Value>,
    groups: BTreeSet<ComputeGroup>,
    auto_close: bool,
    executing: bool,
    next_slice: usize,
    /// Taken by the driver on `execute`.
    rx: Option<mpsc::UnboundedReceiver<Notice>>,
}

struct Shared {
    id: HandleId,
    work: WorkRef,
    params: Arc<[Value]>,
    relay: EventRelay,
    semaphore: Option<Arc<Semaphore>>,
    timeout: Option<Duration>,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<Notice>,
    state: Mutex<HandleState>,
    done: watch::Sender<Outcome>,
    closed: AtomicBool,
    releases: AtomicUsize,
}

/// Handle returned by [`LocalFabric`].
///
/// Dropping the handle closes it.
pub struct LocalHandle {
    shared: Arc<Shared>,
}

impl LocalHandle {
    /// How many times fabric resources were released (0 or 1).
    pub fn releases(&self) -> usize {
        self.shared.releases.load(Ordering::SeqCst)
    }

    /// True once `close` ran or the handle finished.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Current auto-close flag.
    pub fn auto_close(&self) -> bool {
        self.shared.lock().auto_close
    }
}

impl Drop for LocalHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl ComputeHandle for LocalHandle {
    fn id(&self) -> HandleId {
        self.shared.id
    }

    fn set_compute_groups(&self, groups: BTreeSet<ComputeGroup>) {
        self.shared.lock().groups = groups;
    }

    fn compute_groups(&self) -> BTreeSet<ComputeGroup> {
        self.shared.lock().groups.clone()
    }

    fn set_auto_close(&self, auto_close: bool) {
        self.shared.lock().auto_close = auto_close;
    }

    fn on(&self, kind: EventKind, callback: Callback) {
        self.shared.relay.on(kind, callback);
    }

    fn execute(&self) -> Result<(), FabricError> {
        if self.is_closed() {
            return Err(FabricError::Closed);
        }
        let (queued, rx) = {
            let mut st = self.shared.lock();
            if st.executing {
                return Ok(());
            }
            st.executing = true;
            (mem::take(&mut st.queued), st.rx.take())
        };
        let Some(rx) = rx else {
            return Err(FabricError::Closed);
        };

        tracing::info!(handle = %self.shared.id, slices = queued.len(), "handle executing");
        tokio::spawn(Arc::clone(&self.shared).drive(rx));

        self.shared.notify(Notice::Emit(EventPayload::ReadyStateChange(ReadyState::Executing)));
        self.shared.notify(Notice::Emit(EventPayload::Accepted));
        Shared::schedule(&self.shared, queued);
        self.shared.notify(Notice::Check);
        Ok(())
    }

    async fn await_completion(&self) -> Result<Vec<Value>, FabricError> {
        let mut rx = self.shared.done.subscribe();
        if rx.borrow().is_none() && !self.shared.lock().executing {
            return Err(FabricError::NotExecuting);
        }
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| FabricError::Closed)?;
        match &*outcome {
            Some(res) => res.clone(),
            None => Err(FabricError::Closed),
        }
    }

    fn add_slices(&self, slices: Vec<Value>) -> Result<(), FabricError> {
        if self.is_closed() {
            return Err(FabricError::Closed);
        }
        {
            let mut st = self.shared.lock();
            if st.auto_close {
                return Err(FabricError::AutoClose);
            }
            if !st.executing {
                st.queued.extend(slices);
                return Ok(());
            }
        }
        Shared::schedule(&self.shared, slices);
        Ok(())
    }

    fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.releases.fetch_add(1, Ordering::SeqCst);
        self.shared.token.cancel();
        tracing::debug!(handle = %self.shared.id, "handle released");

        let executing = self.shared.lock().executing;
        if executing {
            self.shared.notify(Notice::Closed);
        } else {
            self.shared.done.send_replace(Some(Err(FabricError::Closed)));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Running counters kept by the driver task.
#[derive(Default)]
struct Tally {
    total: usize,
    computed: usize,
    failed: usize,
    results: Vec<Value>,
}

impl Tally {
    fn status(&self) -> EventPayload {
        EventPayload::Status {
            total: self.total,
            computed: self.computed,
            failed: self.failed,
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        // The driver outlives every sender except after it settled; late notices are moot.
        let _ = self.tx.send(notice);
    }

    fn emit(&self, payload: EventPayload) {
        self.relay.emit(&Event::new(self.id, payload));
    }

    /// Spawns one runner per slice; indices continue across calls.
    fn schedule(this: &Arc<Self>, slices: Vec<Value>) {
        if slices.is_empty() {
            return;
        }
        let start = {
            let mut st = this.lock();
            let start = st.next_slice;
            st.next_slice += slices.len();
            start
        };
        this.notify(Notice::Scheduled(slices.len()));

        for (offset, slice) in slices.into_iter().enumerate() {
            tokio::spawn(Arc::clone(this).run_slice(start + offset, slice));
        }
    }

    async fn run_slice(self: Arc<Self>, index: usize, slice: Value) {
        let _permit = match &self.semaphore {
            Some(sem) => {
                tokio::select! {
                    permit = Arc::clone(sem).acquire_owned() => match permit {
                        Ok(p) => Some(p),
                        Err(_) => return,
                    },
                    _ = self.token.cancelled() => return,
                }
            }
            None => None,
        };
        if self.token.is_cancelled() {
            return;
        }

        let tx = self.tx.clone();
        let ctx = SliceContext::new(index, self.token.child_token()).with_console(Arc::new(
            move |slice, message| {
                let _ = tx.send(Notice::Console { slice, message });
            },
        ));
        let work = Arc::clone(&self.work);
        let params = Arc::clone(&self.params);
        let fut = AssertUnwindSafe(async move { work.run(slice, params, ctx).await }).catch_unwind();

        let res = tokio::select! {
            res = async {
                match self.timeout {
                    Some(dur) => time::timeout(dur, fut)
                        .await
                        .map_err(|_| FabricError::SliceTimeout { slice: index, timeout: dur }),
                    None => Ok(fut.await),
                }
            } => res,
            _ = self.token.cancelled() => return,
        };

        let notice = match res {
            Ok(Ok(Ok(value))) => Notice::Result { slice: index, value },
            Ok(Ok(Err(WorkError::Canceled))) if self.token.is_cancelled() => return,
            Ok(Ok(Err(err))) => Notice::Failed(FabricError::SliceFailed {
                slice: index,
                error: err.to_string(),
            }),
            Ok(Err(panic_err)) => {
                let error = panic_message(panic_err.as_ref());
                tracing::error!(handle = %self.id, slice = index, panic = %error, "work panicked");
                Notice::Failed(FabricError::SliceFailed {
                    slice: index,
                    error: format!("panicked: {error}"),
                })
            }
            Err(timeout) => Notice::Failed(timeout),
        };
        self.notify(notice);
    }

    /// Drains the notification queue until the handle settles.
    async fn drive(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Notice>) {
        let mut tally = Tally::default();
        let mut close_requested = false;

        while let Some(notice) = rx.recv().await {
            match notice {
                Notice::Emit(payload) => {
                    self.emit(payload);
                    continue;
                }
                Notice::Scheduled(n) => {
                    tally.total += n;
                    continue;
                }
                Notice::Console { slice, message } => {
                    self.emit(EventPayload::Console {
                        slice,
                        message: message.into(),
                    });
                    continue;
                }
                Notice::Result { slice, value } => {
                    tracing::debug!(handle = %self.id, slice, "slice computed");
                    tally.computed += 1;
                    tally.results.push(value.clone());
                    self.emit(EventPayload::Result { slice, value });
                    self.emit(tally.status());
                }
                Notice::Failed(err) => {
                    tracing::warn!(handle = %self.id, err = %err, label = err.as_label(), "slice failed");
                    tally.failed += 1;
                    self.emit(tally.status());
                    self.settle(Err(err));
                    return;
                }
                Notice::Check => {}
                Notice::Closed => close_requested = true,
            }

            let pending = tally.total - tally.computed;
            if close_requested && pending > 0 {
                self.settle(Err(FabricError::Cancelled { pending }));
                return;
            }
            if pending == 0 && (close_requested || self.lock().auto_close) {
                self.settle(Ok(mem::take(&mut tally.results)));
                return;
            }
        }
    }

    /// Emits the terminal events, resolves waiters and releases the handle.
    fn settle(&self, outcome: Result<Vec<Value>, FabricError>) {
        let summary = outcome.as_ref().map(Vec::len).map_err(FabricError::clone);
        if summary.is_ok() {
            self.emit(EventPayload::ReadyStateChange(ReadyState::Finished));
        }
        self.emit(EventPayload::Complete { outcome: summary });
        self.done.send_replace(Some(outcome));

        if !self.closed.swap(true, Ordering::SeqCst) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
        self.token.cancel();
        self.emit(EventPayload::ReadyStateChange(ReadyState::Closed));
        tracing::info!(handle = %self.id, "handle settled");
    }
}
