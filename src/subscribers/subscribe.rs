//! # Core subscriber trait
//!
//! `Subscribe` is the extension point for plugging reusable observers into a
//! job's handle. A subscriber declares which [`EventKind`]s it wants; the job
//! registers it once per kind on the handle's [`EventRelay`](crate::EventRelay).
//!
//! ## Contract
//! - `on_event` runs on the handle's notification channel. Keep it short and
//!   non-blocking; hand heavy work off to a task or channel.
//! - A panic is caught by the relay and logged.
//!
//! ## Example
//! ```rust
//! use slicechain::{Event, EventKind, Subscribe};
//!
//! struct Audit;
//!
//! impl Subscribe for Audit {
//!     fn on_event(&self, ev: &Event) {
//!         let _ = ev.seq;
//!     }
//!     fn name(&self) -> &'static str { "audit" }
//!     fn kinds(&self) -> &'static [EventKind] { &[EventKind::Complete] }
//! }
//! ```

use crate::events::{Event, EventKind};

/// Contract for event subscribers.
pub trait Subscribe: Send + Sync + 'static {
    /// Handle a single event.
    fn on_event(&self, event: &Event);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Kinds this subscriber wants. Defaults to every kind.
    fn kinds(&self) -> &'static [EventKind] {
        &EventKind::ALL
    }
}
