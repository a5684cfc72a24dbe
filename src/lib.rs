//! # slicechain
//!
//! **Slicechain** orchestrates tree-shaped computations over a pluggable
//! compute fabric.
//!
//! A [`Job`] splits its input into independent **slices**, hands them to a
//! [`ComputeFabric`] and collects one result per slice. Jobs can be chained:
//! a child job consumes its parent's results as its own slices, recursively.
//! Each job dispatches either in **batch** mode (submit everything, wait for
//! completion) or in **streaming** mode (accept slices incrementally, forward
//! results as they arrive).
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │   JobSpec    │   │   JobSpec    │   │   JobSpec    │
//!     │    (root)    │   │  (chained)   │   │  (chained)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//!     ┌──────────────┐ chain ┌──────────────┐ chain ┌──────────────┐
//!     │     Job      │──────►│     Job      │──────►│     Job      │
//!     │ (orchestr.)  │       │              │       │              │
//!     └──────┬───────┘       └──────┬───────┘       └──────┬───────┘
//!            │ submit / execute / add_slices / close       │
//!            ▼                      ▼                      ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ComputeFabric (Arc<dyn ComputeFabric>, shared by every job)      │
//! │  - LocalFabric: in-process, tokio tasks, optional concurrency cap │
//! │  - remote fabrics: implement ComputeFabric + ComputeHandle        │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ ComputeHandle│   │ ComputeHandle│   │ ComputeHandle│
//!     │ (one per job)│   │              │   │              │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ notification     │                  │
//!      │ channel:         │                  │
//!      │ - ReadyState     │                  │
//!      │ - Result         │                  │
//!      │ - Complete ...   │                  │
//!      ▼                  ▼                  ▼
//!   EventRelay ──► internal result collector (first) ──► children
//!              └─► spec callbacks / Subscribe impls
//! ```
//!
//! ### Lifecycle
//! ```text
//! Job::new(spec, fabric) ─► Created
//!
//! dispatch()
//!   ├─► Dispatched: fabric.submit(..), configure, register callbacks
//!   ├─ batch ─────► BatchRunning ─► await completion ─► Closed
//!   │                 └─► children: set_slices(results); dispatch()
//!   │                 ─► Dispatch::Finished(ResultTree)
//!   └─ streaming ─► StreamingOpen ─► Dispatch::Streaming
//!                     ├─► add_slices(..)       (caller)
//!                     ├─► Result ─► streaming children.add_slices([v])
//!                     └─► close policy met ─► Closed
//!                           └─► children finalized; result_tree()
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                       |
//! |-------------------|----------------------------------------------------------------|------------------------------------------|
//! | **Jobs**          | Describe, chain and dispatch units of work.                    | [`JobSpec`], [`Job`], [`Dispatch`]       |
//! | **Results**       | Hierarchical results mirroring the chain.                      | [`ResultTree`]                           |
//! | **Fabric**        | Narrow contract to the executor, plus an in-process default.   | [`ComputeFabric`], [`LocalFabric`]       |
//! | **Events**        | Typed handle events delivered to callbacks and subscribers.    | [`Event`], [`EventKind`], [`Subscribe`]  |
//! | **Work**          | Define work as closures or trait objects.                      | [`Work`], [`WorkFn`], [`WorkRef`]        |
//! | **Errors**        | Typed errors for orchestration, fabric and work.               | [`JobError`], [`FabricError`]            |
//! | **Configuration** | Settings for the in-process fabric.                            | [`FabricConfig`]                         |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use slicechain::{Job, JobSpec, LocalFabric, SliceContext, WorkError, WorkFn, WorkRef};
//!
//! fn int_work(name: &'static str, f: fn(i64) -> i64) -> WorkRef {
//!     WorkFn::arc(name, move |x: Value, _p: Arc<[Value]>, _ctx: SliceContext| async move {
//!         let n = x.as_i64().ok_or_else(|| WorkError::fail("not an integer"))?;
//!         Ok::<_, WorkError>(json!(f(n)))
//!     })
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fabric = Arc::new(LocalFabric::default());
//!
//!     let square = Job::new(
//!         JobSpec::builder("square")
//!             .with_work(int_work("square", |n| n * n))
//!             .with_slices([json!(1), json!(2), json!(3)])
//!             .build(),
//!         fabric,
//!     )?;
//!     square.chain(
//!         JobSpec::builder("negate")
//!             .with_work(int_work("negate", |n| -n))
//!             .build(),
//!     );
//!
//!     let tree = square.dispatch().await?.into_tree().ok_or("batch jobs return a tree")?;
//!     assert_eq!(tree.results.len(), 3);
//!     assert_eq!(tree.chains[0].name, "negate");
//!     assert_eq!(tree.total_results(), 6);
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod events;
mod fabric;
mod job;
mod subscribers;
mod work;

// ---- Public re-exports ----

pub use config::FabricConfig;
pub use error::{FabricError, JobError, WorkError};
pub use events::{Callback, Event, EventKind, EventPayload, EventRelay, ReadyState, callback};
pub use fabric::{
    ComputeFabric, ComputeGroup, ComputeHandle, FabricRef, HandleId, HandleRef, LocalFabric,
    LocalHandle,
};
pub use job::{Dispatch, Job, JobSpec, JobSpecBuilder, JobState, ResultTree, Walk};
pub use subscribers::Subscribe;
pub use work::{BoxWorkFuture, SliceContext, Work, WorkFn, WorkRef};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
