//! # Events emitted by compute handles.
//!
//! The [`EventKind`] enum is the fixed set of notifications a handle can
//! deliver. The [`Event`] struct carries a typed [`EventPayload`] plus
//! metadata (sequence number, timestamp, emitting handle).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Within one handle, events reach callbacks in `seq` order.
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use slicechain::{Event, EventKind, EventPayload, HandleId};
//!
//! let ev = Event::new(HandleId::new(), EventPayload::Result { slice: 0, value: json!(4) });
//!
//! assert_eq!(ev.kind(), EventKind::Result);
//! assert_eq!(ev.result(), Some(&json!(4)));
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use serde_json::Value;

use crate::error::FabricError;
use crate::fabric::HandleId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of handle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// The handle moved to a new [`ReadyState`].
    ReadyStateChange,
    /// The fabric accepted the handle and assigned work to workers.
    Accepted,
    /// One slice produced exactly one output value.
    Result,
    /// The handle finished: every slice produced a result, or it failed.
    Complete,
    /// A work function wrote a console line.
    Console,
    /// Progress counters changed.
    Status,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        EventKind::ReadyStateChange,
        EventKind::Accepted,
        EventKind::Result,
        EventKind::Complete,
        EventKind::Console,
        EventKind::Status,
    ];

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::ReadyStateChange => "ready_state_change",
            EventKind::Accepted => "accepted",
            EventKind::Result => "result",
            EventKind::Complete => "complete",
            EventKind::Console => "console",
            EventKind::Status => "status",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Lifecycle of a handle as seen by the fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// Submitted, not yet executing.
    Submitted,
    /// Slices are being scheduled.
    Executing,
    /// All results delivered.
    Finished,
    /// Released; no further events.
    Closed,
}

/// Typed payload for each [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// See [`EventKind::ReadyStateChange`].
    ReadyStateChange(ReadyState),
    /// See [`EventKind::Accepted`].
    Accepted,
    /// See [`EventKind::Result`].
    Result {
        /// Zero-based index of the slice that produced `value`.
        slice: usize,
        /// The produced output.
        value: Value,
    },
    /// See [`EventKind::Complete`]. `Ok` carries the number of results.
    Complete {
        /// Final outcome of the handle.
        outcome: Result<usize, FabricError>,
    },
    /// See [`EventKind::Console`].
    Console {
        /// Slice whose work function wrote the line.
        slice: usize,
        /// The line itself.
        message: Arc<str>,
    },
    /// See [`EventKind::Status`].
    Status {
        /// Slices submitted so far.
        total: usize,
        /// Slices that produced a result.
        computed: usize,
        /// Slices that failed.
        failed: usize,
    },
}

impl EventPayload {
    /// The kind this payload belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::ReadyStateChange(_) => EventKind::ReadyStateChange,
            EventPayload::Accepted => EventKind::Accepted,
            EventPayload::Result { .. } => EventKind::Result,
            EventPayload::Complete { .. } => EventKind::Complete,
            EventPayload::Console { .. } => EventKind::Console,
            EventPayload::Status { .. } => EventKind::Status,
        }
    }
}

/// Handle event with metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - `handle`: the handle that emitted it
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Emitting handle.
    pub handle: HandleId,
    /// Typed payload.
    pub payload: EventPayload,
}

impl Event {
    /// Creates a new event with current timestamp and next sequence number.
    pub fn new(handle: HandleId, payload: EventPayload) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            handle,
            payload,
        }
    }

    /// The event's kind.
    #[inline]
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// The produced value, for `Result` events.
    #[inline]
    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            EventPayload::Result { value, .. } => Some(value),
            _ => None,
        }
    }

    /// The final outcome, for `Complete` events.
    #[inline]
    pub fn outcome(&self) -> Option<&Result<usize, FabricError>> {
        match &self.payload {
            EventPayload::Complete { outcome } => Some(outcome),
            _ => None,
        }
    }

    /// The console line, for `Console` events.
    #[inline]
    pub fn console(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::Console { message, .. } => Some(message),
            _ => None,
        }
    }
}
