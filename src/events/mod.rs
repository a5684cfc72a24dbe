//! Handle events: types and the callback relay.
//!
//! This module groups the event **data model** and the **relay** that
//! compute handles use to deliver notifications to orchestrator callbacks.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`EventPayload`], [`ReadyState`] event classification and payload
//! - [`EventRelay`], [`Callback`] enum-keyed registry invoked on the handle's notification channel
//!
//! ## Quick reference
//! - **Publishers**: compute handles (`LocalHandle` driver task, or a remote fabric adapter).
//! - **Consumers**: the job's internal result collector (always first), spec
//!   subscriptions, [`Subscribe`](crate::Subscribe) implementations.

mod event;
mod relay;

pub use event::{Event, EventKind, EventPayload, ReadyState};
pub use relay::{Callback, EventRelay, callback};
