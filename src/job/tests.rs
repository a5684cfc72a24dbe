use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::{FabricError, JobError, WorkError};
use crate::events::{Callback, Event, EventKind, callback};
use crate::fabric::{ComputeFabric, ComputeGroup, ComputeHandle, HandleId, HandleRef, LocalFabric, LocalHandle};
use crate::job::{Dispatch, Job, JobSpec, JobState};
use crate::subscribers::Subscribe;
use crate::work::{SliceContext, WorkFn, WorkRef};

/// Fabric call as seen by the recording wrapper, keyed by work name.
#[derive(Debug, Clone, PartialEq)]
enum Call {
    Submit { work: String, slices: Vec<Value> },
    Execute { work: String },
    AddSlices { work: String, slices: Vec<Value> },
}

/// Wraps [`LocalFabric`] and records every call the orchestrator makes.
#[derive(Default)]
struct RecordingFabric {
    inner: LocalFabric,
    calls: Arc<Mutex<Vec<Call>>>,
    handles: Mutex<Vec<(String, Arc<LocalHandle>)>>,
}

impl RecordingFabric {
    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn submitted(&self, work: &str) -> Vec<Vec<Value>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Submit { work: w, slices } if w == work => Some(slices),
                _ => None,
            })
            .collect()
    }

    fn added(&self, work: &str) -> Vec<Vec<Value>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::AddSlices { work: w, slices } if w == work => Some(slices),
                _ => None,
            })
            .collect()
    }

    fn handle(&self, work: &str) -> Option<Arc<LocalHandle>> {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .find(|(w, _)| w == work)
            .map(|(_, h)| Arc::clone(h))
    }
}

#[async_trait]
impl ComputeFabric for RecordingFabric {
    async fn submit(
        &self,
        slices: Vec<Value>,
        work: WorkRef,
        constant_params: Vec<Value>,
    ) -> Result<HandleRef, FabricError> {
        let name = work.name().to_owned();
        self.calls.lock().unwrap().push(Call::Submit {
            work: name.clone(),
            slices: slices.clone(),
        });
        let inner = self.inner.open(slices, work, constant_params);
        self.handles
            .lock()
            .unwrap()
            .push((name.clone(), Arc::clone(&inner)));
        Ok(Arc::new(RecordingHandle {
            inner,
            work: name,
            calls: Arc::clone(&self.calls),
        }))
    }
}

struct RecordingHandle {
    inner: Arc<LocalHandle>,
    work: String,
    calls: Arc<Mutex<Vec<Call>>>,
}

#[async_trait]
impl ComputeHandle for RecordingHandle {
    fn id(&self) -> HandleId {
        self.inner.id()
    }

    fn set_compute_groups(&self, groups: BTreeSet<ComputeGroup>) {
        self.inner.set_compute_groups(groups)
    }

    fn compute_groups(&self) -> BTreeSet<ComputeGroup> {
        self.inner.compute_groups()
    }

    fn set_auto_close(&self, auto_close: bool) {
        self.inner.set_auto_close(auto_close)
    }

    fn on(&self, kind: EventKind, callback: Callback) {
        self.inner.on(kind, callback)
    }

    fn execute(&self) -> Result<(), FabricError> {
        self.calls.lock().unwrap().push(Call::Execute {
            work: self.work.clone(),
        });
        self.inner.execute()
    }

    async fn await_completion(&self) -> Result<Vec<Value>, FabricError> {
        self.inner.await_completion().await
    }

    fn add_slices(&self, slices: Vec<Value>) -> Result<(), FabricError> {
        self.calls.lock().unwrap().push(Call::AddSlices {
            work: self.work.clone(),
            slices: slices.clone(),
        });
        self.inner.add_slices(slices)
    }

    fn close(&self) {
        self.inner.close()
    }
}

fn int_work(name: &'static str, f: fn(i64) -> i64) -> WorkRef {
    WorkFn::arc(
        name,
        move |x: Value, _p: Arc<[Value]>, _ctx: SliceContext| async move {
            let n = x.as_i64().ok_or_else(|| WorkError::fail("not an integer"))?;
            Ok::<_, WorkError>(json!(f(n)))
        },
    )
}

fn double() -> WorkRef {
    int_work("double", |n| n * 2)
}

fn square() -> WorkRef {
    int_work("square", |n| n * n)
}

fn negate() -> WorkRef {
    int_work("negate", |n| -n)
}

/// Waits on its cancellation token; never produces a result.
fn stuck() -> WorkRef {
    WorkFn::arc(
        "stuck",
        |_x: Value, _p: Arc<[Value]>, ctx: SliceContext| async move {
            ctx.token().cancelled().await;
            Err::<Value, _>(WorkError::Canceled)
        },
    )
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|v| json!(v)).collect()
}

fn sorted(mut v: Vec<Value>) -> Vec<Value> {
    v.sort_by_key(|x| x.as_i64());
    v
}

fn result_channel() -> (Callback, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cb = callback(move |ev: &Event| {
        if let Some(v) = ev.result() {
            let _ = tx.send(v.clone());
        }
    });
    (cb, rx)
}

#[tokio::test]
async fn batch_results_match_submitted_slices() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(double())
            .with_slices(ints(&[1, 2, 3]))
            .build(),
        fabric.clone(),
    )
    .unwrap();

    let tree = job.dispatch().await.unwrap().into_tree().unwrap();

    assert_eq!(tree.name, "t");
    assert_eq!(sorted(tree.results.clone()), ints(&[2, 4, 6]));
    assert!(tree.chains.is_empty());
    assert_eq!(job.results(), tree.results);
    assert_eq!(job.state(), JobState::Closed);
    assert_eq!(fabric.handle("double").unwrap().releases(), 1);
}

#[tokio::test]
async fn batch_child_receives_parent_results_after_completion() {
    let fabric = Arc::new(RecordingFabric::default());
    let root = Job::new(
        JobSpec::builder("square")
            .with_work(square())
            .with_slices(ints(&[1, 2, 3]))
            .build(),
        fabric.clone(),
    )
    .unwrap();
    let child = root.chain(JobSpec::builder("negate").with_work(negate()).build());

    let tree = root.dispatch().await.unwrap().into_tree().unwrap();

    assert_eq!(sorted(tree.results.clone()), ints(&[1, 4, 9]));
    assert_eq!(tree.chains.len(), 1);
    assert_eq!(tree.chains[0].name, "negate");
    assert_eq!(sorted(tree.chains[0].results.clone()), ints(&[-9, -4, -1]));

    assert_eq!(fabric.submitted("negate"), vec![tree.results.clone()]);
    let calls = fabric.calls();
    let executed = calls
        .iter()
        .position(|c| *c == Call::Execute { work: "square".into() })
        .unwrap();
    let child_submit = calls
        .iter()
        .position(|c| matches!(c, Call::Submit { work, .. } if work == "negate"))
        .unwrap();
    assert!(executed < child_submit);
    assert_eq!(child.state(), JobState::Closed);
}

#[tokio::test]
async fn streaming_parent_forwards_each_result_to_streaming_child() {
    let fabric = Arc::new(RecordingFabric::default());
    let root = Job::new(
        JobSpec::builder("double").with_work(double()).streaming(true).build(),
        fabric.clone(),
    )
    .unwrap();
    let child = root.chain(
        JobSpec::builder("negate")
            .with_work(negate())
            .streaming(true)
            .build(),
    );

    assert_eq!(root.dispatch().await.unwrap(), Dispatch::Streaming);
    assert_eq!(child.state(), JobState::StreamingOpen);
    for n in [1, 2, 3] {
        root.add_slices(ints(&[n])).unwrap();
    }
    root.finish_input().unwrap();

    let tree = root.result_tree().await.unwrap();

    assert_eq!(sorted(tree.results.clone()), ints(&[2, 4, 6]));
    assert_eq!(sorted(tree.chains[0].results.clone()), ints(&[-6, -4, -2]));
    let forwarded = fabric.added("negate");
    assert_eq!(forwarded.len(), 3);
    assert!(forwarded.iter().all(|slices| slices.len() == 1));
    assert_eq!(
        sorted(forwarded.into_iter().flatten().collect()),
        ints(&[2, 4, 6])
    );
}

#[tokio::test]
async fn add_slices_on_batch_job_is_not_streaming() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(double())
            .with_slices(ints(&[1, 2]))
            .build(),
        fabric,
    )
    .unwrap();

    assert_matches!(job.add_slices(ints(&[3])), Err(JobError::NotStreaming { .. }));

    job.dispatch().await.unwrap();
    let before = job.results();
    assert_matches!(job.add_slices(ints(&[3])), Err(JobError::NotStreaming { .. }));
    assert_eq!(job.results(), before);
    assert_eq!(before.len(), 2);
}

#[tokio::test]
async fn close_twice_releases_once() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t").with_work(double()).streaming(true).build(),
        fabric.clone(),
    )
    .unwrap();
    job.dispatch().await.unwrap();

    job.close().unwrap();
    job.close().unwrap();

    assert_eq!(job.state(), JobState::Closed);
    assert_eq!(fabric.handle("double").unwrap().releases(), 1);
    let tree = job.result_tree().await.unwrap();
    assert!(tree.results.is_empty());
}

#[tokio::test]
async fn streaming_results_collected_in_arrival_order() {
    let fabric = Arc::new(RecordingFabric::default());
    let (cb, mut rx) = result_channel();
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(double())
            .streaming(true)
            .on(EventKind::Result, cb)
            .build(),
        fabric,
    )
    .unwrap();
    job.dispatch().await.unwrap();

    job.add_slices(ints(&[5])).unwrap();
    assert_eq!(rx.recv().await, Some(json!(10)));
    job.add_slices(ints(&[6])).unwrap();
    assert_eq!(rx.recv().await, Some(json!(12)));

    assert_eq!(job.results(), ints(&[10, 12]));
    assert_eq!(job.state(), JobState::StreamingOpen);
}

#[tokio::test]
async fn streaming_add_same_slice_twice_collects_both() {
    let fabric = Arc::new(RecordingFabric::default());
    let (cb, mut rx) = result_channel();
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(double())
            .streaming(true)
            .on(EventKind::Result, cb)
            .build(),
        fabric.clone(),
    )
    .unwrap();
    job.dispatch().await.unwrap();

    job.add_slices(ints(&[5])).unwrap();
    job.add_slices(ints(&[5])).unwrap();
    rx.recv().await.unwrap();
    rx.recv().await.unwrap();

    assert_eq!(job.results(), ints(&[10, 10]));
    assert_eq!(fabric.added("double"), vec![ints(&[5]), ints(&[5])]);
}

#[tokio::test]
async fn streaming_closes_at_expected_results() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(double())
            .streaming(true)
            .with_expected_results(2)
            .build(),
        fabric.clone(),
    )
    .unwrap();
    job.dispatch().await.unwrap();

    job.add_slices(ints(&[1, 2, 3])).unwrap();
    let tree = job.result_tree().await.unwrap();

    assert_eq!(tree.results.len(), 2);
    assert_eq!(job.state(), JobState::Closed);
    assert_matches!(job.add_slices(ints(&[4])), Err(JobError::Closed { .. }));
    assert_eq!(fabric.handle("double").unwrap().releases(), 1);
}

#[tokio::test]
async fn finish_input_drains_then_closes() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t").with_work(double()).streaming(true).build(),
        fabric,
    )
    .unwrap();
    job.dispatch().await.unwrap();

    job.add_slices(ints(&[1, 2])).unwrap();
    job.finish_input().unwrap();
    assert_matches!(job.add_slices(ints(&[3])), Err(JobError::Closed { .. }));

    let tree = job.result_tree().await.unwrap();
    assert_eq!(sorted(tree.results), ints(&[2, 4]));
}

#[tokio::test]
async fn finish_input_with_nothing_submitted_closes_immediately() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t").with_work(double()).streaming(true).build(),
        fabric,
    )
    .unwrap();
    job.dispatch().await.unwrap();

    job.finish_input().unwrap();
    assert_eq!(job.state(), JobState::Closed);
}

#[tokio::test]
async fn cancel_propagates_to_children() {
    let fabric = Arc::new(RecordingFabric::default());
    let root = Job::new(
        JobSpec::builder("root").with_work(stuck()).streaming(true).build(),
        fabric.clone(),
    )
    .unwrap();
    let child = root.chain(JobSpec::builder("child").with_work(negate()).build());
    let grandchild = child.chain(JobSpec::builder("grandchild").with_work(negate()).build());

    root.dispatch().await.unwrap();
    root.add_slices(ints(&[1])).unwrap();
    root.cancel();
    root.cancel();

    assert_matches!(
        root.result_tree().await,
        Err(JobError::Fabric(FabricError::Cancelled { pending: 1 }))
    );
    assert_eq!(child.state(), JobState::Closed);
    assert_eq!(grandchild.state(), JobState::Closed);
    assert_matches!(
        grandchild.result_tree().await,
        Err(JobError::Fabric(FabricError::Cancelled { .. }))
    );
    assert!(fabric.submitted("negate").is_empty());
    assert_eq!(fabric.handle("stuck").unwrap().releases(), 1);
}

#[tokio::test]
async fn cancel_interrupts_batch_dispatch() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(stuck())
            .with_slices(ints(&[1]))
            .build(),
        fabric,
    )
    .unwrap();

    let running = tokio::spawn({
        let job = job.clone();
        async move { job.dispatch().await }
    });
    while job.state() != JobState::BatchRunning {
        tokio::task::yield_now().await;
    }
    job.cancel();

    assert_matches!(
        running.await.unwrap(),
        Err(JobError::Fabric(FabricError::Cancelled { pending: 1 }))
    );
    assert_eq!(job.state(), JobState::Closed);
}

#[tokio::test]
async fn batch_parent_drains_streaming_child() {
    let fabric = Arc::new(RecordingFabric::default());
    let root = Job::new(
        JobSpec::builder("square")
            .with_work(square())
            .with_slices(ints(&[1, 2, 3]))
            .build(),
        fabric.clone(),
    )
    .unwrap();
    root.chain(
        JobSpec::builder("negate")
            .with_work(negate())
            .streaming(true)
            .build(),
    );

    let tree = root.dispatch().await.unwrap().into_tree().unwrap();

    assert_eq!(sorted(tree.chains[0].results.clone()), ints(&[-9, -4, -1]));
    assert_eq!(fabric.submitted("negate"), vec![tree.results.clone()]);
    assert!(fabric.added("negate").is_empty());
}

#[tokio::test]
async fn streaming_parent_dispatches_batch_child_on_close() {
    let fabric = Arc::new(RecordingFabric::default());
    let root = Job::new(
        JobSpec::builder("double").with_work(double()).streaming(true).build(),
        fabric.clone(),
    )
    .unwrap();
    let child = root.chain(JobSpec::builder("negate").with_work(negate()).build());

    root.dispatch().await.unwrap();
    root.add_slices(ints(&[1, 2])).unwrap();
    assert_eq!(child.state(), JobState::Created);
    root.finish_input().unwrap();

    let tree = root.result_tree().await.unwrap();

    assert_eq!(sorted(tree.results.clone()), ints(&[2, 4]));
    assert_eq!(sorted(tree.chains[0].results.clone()), ints(&[-4, -2]));
    assert_eq!(fabric.submitted("negate"), vec![tree.results]);
}

#[tokio::test]
async fn internal_collector_runs_before_user_callbacks() {
    let fabric = Arc::new(RecordingFabric::default());
    let slot: Arc<Mutex<Option<Job>>> = Arc::new(Mutex::new(None));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let spec = JobSpec::builder("t")
        .with_work(double())
        .with_slices(ints(&[1]))
        .on_result({
            let slot = Arc::clone(&slot);
            let seen = Arc::clone(&seen);
            move |_| {
                let collected = slot.lock().unwrap().as_ref().map(|j| j.results().len());
                seen.lock().unwrap().push(("first", collected));
            }
        })
        .on(EventKind::Result, {
            let seen = Arc::clone(&seen);
            callback(move |_| seen.lock().unwrap().push(("second", None)))
        })
        .build();
    let job = Job::new(spec, fabric).unwrap();
    *slot.lock().unwrap() = Some(job.clone());

    job.dispatch().await.unwrap();
    slot.lock().unwrap().take();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![("first", Some(1)), ("second", None)]
    );
}

#[tokio::test]
async fn second_dispatch_is_rejected() {
    let fabric = Arc::new(RecordingFabric::default());
    let streaming = Job::new(
        JobSpec::builder("s").with_work(double()).streaming(true).build(),
        fabric.clone(),
    )
    .unwrap();
    streaming.dispatch().await.unwrap();
    assert_matches!(
        streaming.dispatch().await,
        Err(JobError::AlreadyDispatched { .. })
    );
    assert_matches!(
        streaming.set_slices(ints(&[1])),
        Err(JobError::AlreadyDispatched { .. })
    );

    let batch = Job::new(JobSpec::builder("b").with_work(double()).build(), fabric.clone()).unwrap();
    batch.dispatch().await.unwrap();
    assert_matches!(batch.dispatch().await, Err(JobError::Closed { .. }));
    assert_eq!(fabric.submitted("double").len(), 2);
}

#[tokio::test]
async fn handle_is_acquired_lazily() {
    let fabric = Arc::new(RecordingFabric::default());
    let root = Job::new(
        JobSpec::builder("t").with_work(double()).streaming(true).build(),
        fabric.clone(),
    )
    .unwrap();
    root.chain(JobSpec::builder("c").with_work(negate()).build());

    assert!(fabric.calls().is_empty());
    assert_matches!(root.id(), Err(JobError::NotInitialized { .. }));
    assert_matches!(
        root.subscribe(EventKind::Result, callback(|_| {})),
        Err(JobError::NotInitialized { .. })
    );
    assert_matches!(root.add_slices(ints(&[1])), Err(JobError::NotInitialized { .. }));
    assert_matches!(root.close(), Err(JobError::NotInitialized { .. }));

    root.dispatch().await.unwrap();
    assert_eq!(root.id().unwrap(), fabric.handle("double").unwrap().id());
    assert_eq!(fabric.submitted("double"), vec![Vec::<Value>::new()]);
    assert!(fabric.submitted("negate").is_empty());
}

#[tokio::test]
async fn invalid_specs_are_rejected() {
    let fabric = Arc::new(RecordingFabric::default());
    assert_matches!(
        Job::new(JobSpec::builder("no-work").build(), fabric.clone()),
        Err(JobError::InvalidSpec { .. })
    );
    assert_matches!(
        Job::new(JobSpec::builder("").with_work(double()).build(), fabric.clone()),
        Err(JobError::InvalidSpec { .. })
    );

    let root = Job::new(
        JobSpec::builder("t")
            .with_work(double())
            .with_slices(ints(&[1]))
            .build(),
        fabric.clone(),
    )
    .unwrap();
    let child = root.chain(JobSpec::builder("broken").build());

    assert_matches!(root.dispatch().await, Err(JobError::InvalidSpec { .. }));
    assert_eq!(child.state(), JobState::Closed);
    assert_eq!(fabric.calls().len(), 2);
}

#[tokio::test]
async fn slice_failure_closes_job_and_cancels_children() {
    let fabric = Arc::new(RecordingFabric::default());
    let picky = WorkFn::arc(
        "picky",
        |x: Value, _p: Arc<[Value]>, _ctx: SliceContext| async move {
            match x.as_i64() {
                Some(2) => Err(WorkError::fail("two is not allowed")),
                _ => Ok(x),
            }
        },
    );
    let root = Job::new(
        JobSpec::builder("t")
            .with_work(picky)
            .with_slices(ints(&[2]))
            .build(),
        fabric.clone(),
    )
    .unwrap();
    let child = root.chain(JobSpec::builder("c").with_work(negate()).build());

    assert_matches!(
        root.dispatch().await,
        Err(JobError::Fabric(FabricError::SliceFailed { slice: 0, .. }))
    );
    assert_matches!(
        root.result_tree().await,
        Err(JobError::Fabric(FabricError::SliceFailed { .. }))
    );
    assert_eq!(child.state(), JobState::Closed);
    assert!(fabric.submitted("negate").is_empty());
}

#[tokio::test]
async fn streaming_failure_is_reported_by_result_tree() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(double())
            .streaming(true)
            .build(),
        fabric,
    )
    .unwrap();
    job.dispatch().await.unwrap();

    job.add_slices(vec![json!("not a number")]).unwrap();

    assert_matches!(
        job.result_tree().await,
        Err(JobError::Fabric(FabricError::SliceFailed { slice: 0, .. }))
    );
}

#[tokio::test]
async fn subscribers_attach_to_live_handle() {
    struct Forward(mpsc::UnboundedSender<Value>);

    impl Subscribe for Forward {
        fn on_event(&self, ev: &Event) {
            if let Some(v) = ev.result() {
                let _ = self.0.send(v.clone());
            }
        }

        fn kinds(&self) -> &'static [EventKind] {
            &[EventKind::Result]
        }
    }

    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t").with_work(double()).streaming(true).build(),
        fabric,
    )
    .unwrap();
    job.dispatch().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    job.subscribe_with(Arc::new(Forward(tx))).unwrap();
    job.add_slices(ints(&[4])).unwrap();

    assert_eq!(rx.recv().await, Some(json!(8)));
    job.close().unwrap();
    assert_matches!(
        job.subscribe(EventKind::Result, callback(|_| {})),
        Err(JobError::Closed { .. })
    );
}

#[tokio::test]
async fn set_slices_overrides_defaults_before_dispatch() {
    let fabric = Arc::new(RecordingFabric::default());
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(double())
            .with_slices(ints(&[1]))
            .build(),
        fabric,
    )
    .unwrap();

    job.set_slices(ints(&[7, 8])).unwrap();
    let tree = job.dispatch().await.unwrap().into_tree().unwrap();

    assert_eq!(sorted(tree.results), ints(&[14, 16]));
    assert_matches!(job.set_slices(ints(&[1])), Err(JobError::Closed { .. }));
}

#[tokio::test]
async fn chain_after_dispatch_returns_detached_job() {
    let fabric = Arc::new(RecordingFabric::default());
    let root = Job::new(
        JobSpec::builder("t").with_work(double()).streaming(true).build(),
        fabric,
    )
    .unwrap();
    root.dispatch().await.unwrap();

    let late = root.chain(JobSpec::builder("late").with_work(negate()).build());

    assert!(root.children().is_empty());
    assert_eq!(late.state(), JobState::Created);
}

#[tokio::test]
async fn compute_groups_and_params_reach_the_fabric() {
    let fabric = Arc::new(RecordingFabric::default());
    let scale = WorkFn::arc(
        "scale",
        |x: Value, p: Arc<[Value]>, _ctx: SliceContext| async move {
            let factor = p.first().and_then(Value::as_i64).unwrap_or(1);
            Ok::<_, WorkError>(json!(x.as_i64().unwrap_or(0) * factor))
        },
    );
    let group = ComputeGroup::new("sheridan", "dcp");
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(scale)
            .with_slices(ints(&[1, 2]))
            .with_params([json!(10)])
            .with_compute_group(group.clone())
            .build(),
        fabric.clone(),
    )
    .unwrap();

    let tree = job.dispatch().await.unwrap().into_tree().unwrap();

    assert_eq!(sorted(tree.results), ints(&[10, 20]));
    let handle = fabric.handle("scale").unwrap();
    assert_eq!(handle.compute_groups(), BTreeSet::from([group]));
    assert!(handle.auto_close());
}

#[tokio::test]
async fn panicking_work_fails_batch_dispatch() {
    let fabric = Arc::new(RecordingFabric::default());
    let explosive = WorkFn::arc(
        "explosive",
        |_x: Value, _p: Arc<[Value]>, _ctx: SliceContext| async move {
            if true {
                panic!("work panicked");
            }
            Ok::<_, WorkError>(Value::Null)
        },
    );
    let job = Job::new(
        JobSpec::builder("t")
            .with_work(explosive)
            .with_slices(ints(&[1]))
            .build(),
        fabric,
    )
    .unwrap();

    let res = tokio::time::timeout(std::time::Duration::from_secs(2), job.dispatch())
        .await
        .expect("dispatch must return after a panicking slice");

    assert_matches!(
        res,
        Err(JobError::Fabric(FabricError::SliceFailed { slice: 0, .. }))
    );
    assert_eq!(job.state(), JobState::Closed);
}

#[tokio::test]
async fn streaming_child_closed_by_expected_results_does_not_fail_parent() {
    let fabric = Arc::new(RecordingFabric::default());
    let root = Job::new(
        JobSpec::builder("square")
            .with_work(square())
            .with_slices(ints(&[1, 2, 3]))
            .build(),
        fabric,
    )
    .unwrap();
    let child = root.chain(
        JobSpec::builder("negate")
            .with_work(negate())
            .streaming(true)
            .with_expected_results(0)
            .build(),
    );

    let tree = root.dispatch().await.unwrap().into_tree().unwrap();

    assert_eq!(sorted(tree.results.clone()), ints(&[1, 4, 9]));
    assert!(tree.chains[0].results.is_empty());
    assert_eq!(child.state(), JobState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn streaming_child_closing_early_on_worker_threads_does_not_fail_parent() {
    for _ in 0..50 {
        let fabric = Arc::new(RecordingFabric::default());
        let root = Job::new(
            JobSpec::builder("square")
                .with_work(square())
                .with_slices(ints(&[1, 2, 3]))
                .build(),
            fabric,
        )
        .unwrap();
        root.chain(
            JobSpec::builder("negate")
                .with_work(negate())
                .streaming(true)
                .with_expected_results(1)
                .build(),
        );

        let tree = root.dispatch().await.unwrap().into_tree().unwrap();
        assert_eq!(tree.chains[0].results.len(), 1);
    }
}
