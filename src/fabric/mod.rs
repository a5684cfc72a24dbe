//! # Compute fabric contract.
//!
//! The orchestrator never executes work itself. It drives a
//! [`ComputeFabric`] through the narrow interface below and reacts to the
//! events its handles deliver.
//!
//! ## Wiring
//! ```text
//! Job::dispatch()
//!   └─► fabric.submit(slices, work, params) ─► HandleRef
//!         ├─► set_compute_groups / set_auto_close / on(kind, cb)
//!         ├─► execute()                    (non-blocking)
//!         ├─► add_slices(..)               (streaming only)
//!         ├─► await_completion().await     (batch only)
//!         └─► close()                      (idempotent)
//! ```
//!
//! The fabric is an explicit client object: construct it once, wrap it in an
//! `Arc` and pass it to every [`Job`](crate::Job). [`LocalFabric`] is the
//! in-process implementation shipped with the crate.

mod group;
mod local;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::FabricError;
use crate::events::{Callback, EventKind};
use crate::work::WorkRef;

pub use group::ComputeGroup;
pub use local::{LocalFabric, LocalHandle};

/// Shared handle to a compute fabric.
pub type FabricRef = Arc<dyn ComputeFabric>;

/// Shared handle to one submitted unit of work.
pub type HandleRef = Arc<dyn ComputeHandle>;

/// Identifier assigned to a handle at submission.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(Uuid);

impl HandleId {
    /// Generates a fresh, time-ordered identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for HandleId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandleId({})", self.0)
    }
}

/// Entry point of a compute fabric.
#[async_trait]
pub trait ComputeFabric: Send + Sync + 'static {
    /// Creates a handle for `slices` processed by `work` with `constant_params`.
    ///
    /// Nothing runs until [`ComputeHandle::execute`].
    async fn submit(
        &self,
        slices: Vec<Value>,
        work: WorkRef,
        constant_params: Vec<Value>,
    ) -> Result<HandleRef, FabricError>;
}

/// One submitted unit of work on a fabric.
///
/// ### Rules
/// - Configuration (`set_compute_groups`, `set_auto_close`) happens before `execute`.
/// - Listeners registered with `on` for the same kind run in registration order.
/// - `close` releases fabric resources exactly once, however often it is called.
#[async_trait]
pub trait ComputeHandle: Send + Sync + 'static {
    /// Identifier assigned at submission.
    fn id(&self) -> HandleId;

    /// Restricts which workers may accept this handle's slices.
    fn set_compute_groups(&self, groups: BTreeSet<ComputeGroup>);

    /// Compute groups as currently configured.
    fn compute_groups(&self) -> BTreeSet<ComputeGroup>;

    /// When set, the handle closes itself once every slice produced a result.
    fn set_auto_close(&self, auto_close: bool);

    /// Registers a listener for `kind`.
    fn on(&self, kind: EventKind, callback: Callback);

    /// Begins processing. Returns immediately.
    fn execute(&self) -> Result<(), FabricError>;

    /// Waits until every submitted slice produced a result, or the handle failed.
    ///
    /// Results are in delivery order.
    async fn await_completion(&self) -> Result<Vec<Value>, FabricError>;

    /// Schedules more slices on a handle whose auto-close flag is off.
    fn add_slices(&self, slices: Vec<Value>) -> Result<(), FabricError>;

    /// Releases fabric resources. Idempotent.
    fn close(&self);
}
