//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, a reusable alternative to
//! plain closures for observing a job's handle events.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   ComputeHandle ── notification channel ──► EventRelay::emit(&Event)
//!                                                  │
//!                                                  ├──► internal result collector (always first)
//!                                                  ├──► spec callbacks (closures)
//!                                                  └──► Subscribe::on_event(&Event)
//!                                                          │
//!                                                     ┌────┴────┬─────────┐
//!                                                     ▼         ▼         ▼
//!                                                 LogWriter  Metrics   Custom
//! ```

mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
