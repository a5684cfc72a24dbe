//! Per-invocation context handed to a [`Work`](crate::Work) function.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Receives console lines written by work functions: `(slice, message)`.
pub(crate) type ConsoleSink = Arc<dyn Fn(usize, String) + Send + Sync>;

/// Context for one work invocation.
///
/// Carries the slice index, a cancellation token that fires when the owning
/// handle closes, and a console writer routed to `Console` events.
#[derive(Clone)]
pub struct SliceContext {
    slice: usize,
    token: CancellationToken,
    console: Option<ConsoleSink>,
}

impl SliceContext {
    /// Creates a context without a console sink (console lines are dropped).
    pub fn new(slice: usize, token: CancellationToken) -> Self {
        Self {
            slice,
            token,
            console: None,
        }
    }

    pub(crate) fn with_console(mut self, sink: ConsoleSink) -> Self {
        self.console = Some(sink);
        self
    }

    /// Zero-based index of the slice within its handle.
    pub fn slice(&self) -> usize {
        self.slice
    }

    /// Token cancelled when the handle closes before this slice finished.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Shorthand for `self.token().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Writes a console line; it reaches subscribers as a `Console` event.
    pub fn console(&self, message: impl Into<String>) {
        if let Some(sink) = &self.console {
            sink(self.slice, message.into());
        }
    }
}

impl fmt::Debug for SliceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceContext")
            .field("slice", &self.slice)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
