//! # LogWriter: event logger
//!
//! A minimal subscriber that renders every [`Event`] as a `tracing` record.
//! Use it for demos and debugging; install a `tracing` subscriber to see output.
//!
//! ## Example output
//! ```text
//! INFO [ready] handle=0190… state=Executing
//! INFO [accepted] handle=0190…
//! DEBUG [result] handle=0190… slice=2 value=6
//! DEBUG [status] handle=0190… total=3 computed=3 failed=0
//! INFO [complete] handle=0190… results=3
//! ```

use crate::events::{Event, EventPayload};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Subscribe for LogWriter {
    fn on_event(&self, e: &Event) {
        let handle = e.handle;
        match &e.payload {
            EventPayload::ReadyStateChange(state) => {
                tracing::info!(%handle, ?state, "[ready]");
            }
            EventPayload::Accepted => {
                tracing::info!(%handle, "[accepted]");
            }
            EventPayload::Result { slice, value } => {
                tracing::debug!(%handle, slice, %value, "[result]");
            }
            EventPayload::Complete { outcome: Ok(n) } => {
                tracing::info!(%handle, results = n, "[complete]");
            }
            EventPayload::Complete { outcome: Err(err) } => {
                tracing::warn!(%handle, err = %err, label = err.as_label(), "[complete]");
            }
            EventPayload::Console { slice, message } => {
                tracing::info!(%handle, slice, %message, "[console]");
            }
            EventPayload::Status {
                total,
                computed,
                failed,
            } => {
                tracing::debug!(%handle, total, computed, failed, "[status]");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FabricError;
    use crate::events::{EventKind, EventRelay, callback};
    use crate::fabric::HandleId;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn renders_every_payload_kind() {
        let relay = EventRelay::new();
        let writer = Arc::new(LogWriter::new());
        for kind in writer.kinds() {
            let w = Arc::clone(&writer);
            relay.on(*kind, callback(move |ev| w.on_event(ev)));
        }

        let id = HandleId::new();
        let payloads = [
            EventPayload::Accepted,
            EventPayload::Result { slice: 0, value: json!(6) },
            EventPayload::Status { total: 1, computed: 1, failed: 0 },
            EventPayload::Console { slice: 0, message: "hi".into() },
            EventPayload::Complete { outcome: Ok(1) },
            EventPayload::Complete { outcome: Err(FabricError::Cancelled { pending: 2 }) },
        ];
        for payload in payloads {
            assert_eq!(relay.emit(&Event::new(id, payload)), 1);
        }
        assert_eq!(relay.count(EventKind::ReadyStateChange), 1);
        assert_eq!(writer.name(), "LogWriter");
    }
}
