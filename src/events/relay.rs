//! # EventRelay: enum-keyed callback registry.
//!
//! [`EventRelay`] maps each [`EventKind`] to an ordered list of callbacks.
//! Compute handles own one relay and call [`EventRelay::emit`] from their
//! notification channel.
//!
//! ## What it guarantees
//! - Every callback registered for a kind is invoked for every event of that kind.
//! - Callbacks for one kind run in registration order.
//! - Panics inside a callback are caught and logged; delivery continues.
//! - The registry lock is not held while callbacks run, so a callback may
//!   register further callbacks or drive other handles.
//!
//! ## Diagram
//! ```text
//!    emit(&Event)
//!        │  kind = ev.kind()
//!        ├── snapshot callbacks[kind] (under lock)
//!        └── for cb in snapshot ─► catch_unwind(cb(&ev))
//! ```

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};

use crate::events::{Event, EventKind};

/// Callback invoked for matching events.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Registry of callbacks keyed by [`EventKind`].
#[derive(Default)]
pub struct EventRelay {
    callbacks: Mutex<HashMap<EventKind, Vec<Callback>>>,
}

impl EventRelay {
    /// Creates an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `kind`, after any existing ones.
    pub fn on(&self, kind: EventKind, callback: Callback) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(callback);
    }

    /// Number of callbacks registered for `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Invokes every callback registered for the event's kind, in order.
    ///
    /// Returns the number of callbacks invoked (including ones that panicked).
    pub fn emit(&self, event: &Event) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Callback> = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        for cb in &snapshot {
            if let Err(panic_err) = catch_unwind(AssertUnwindSafe(|| cb(event))) {
                tracing::error!(
                    kind = %kind,
                    seq = event.seq,
                    handle = %event.handle,
                    panic = ?panic_err,
                    "event callback panicked"
                );
            }
        }
        snapshot.len()
    }
}
