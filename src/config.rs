//! # Reference fabric configuration.
//!
//! Provides [`FabricConfig`], the settings for [`LocalFabric`](crate::LocalFabric).
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no semaphore created)
//! - `slice_timeout = 0s` → no per-slice timeout

use std::time::Duration;

/// Settings for the in-process reference fabric.
///
/// ## Field semantics
/// - `max_concurrent`: slices executing at once across all handles of one fabric (`0` = unlimited)
/// - `slice_timeout`: limit for a single work invocation (`0s` = none)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over checking for `0` directly.
#[derive(Clone, Debug)]
pub struct FabricConfig {
    /// Maximum number of slices executing concurrently.
    ///
    /// - `0` = unlimited (no semaphore)
    /// - `n > 0` = at most `n` work invocations run simultaneously
    pub max_concurrent: usize,

    /// Per-slice timeout.
    ///
    /// A slice that exceeds it fails its handle with
    /// [`FabricError::SliceTimeout`](crate::FabricError::SliceTimeout).
    pub slice_timeout: Duration,
}

impl FabricConfig {
    /// Returns the concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` concurrent slices
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns the per-slice timeout as an `Option`.
    #[inline]
    pub fn slice_timeout(&self) -> Option<Duration> {
        if self.slice_timeout == Duration::ZERO {
            None
        } else {
            Some(self.slice_timeout)
        }
    }
}

impl Default for FabricConfig {
    /// Default configuration:
    ///
    /// - `max_concurrent = 0` (unlimited)
    /// - `slice_timeout = 0s` (no timeout)
    fn default() -> Self {
        Self {
            max_concurrent: 0,
            slice_timeout: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_mean_unbounded() {
        let cfg = FabricConfig::default();
        assert_eq!(cfg.concurrency_limit(), None);
        assert_eq!(cfg.slice_timeout(), None);
    }

    #[test]
    fn non_zero_values_are_limits() {
        let cfg = FabricConfig {
            max_concurrent: 4,
            slice_timeout: Duration::from_millis(250),
        };
        assert_eq!(cfg.concurrency_limit(), Some(4));
        assert_eq!(cfg.slice_timeout(), Some(Duration::from_millis(250)));
    }
}
