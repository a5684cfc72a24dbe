//! Compute group credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Worker-authorization scope: a join key and its secret.
///
/// Opaque to the orchestrator and passed to the fabric unmodified.
/// `Debug` output redacts the secret.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeGroup {
    /// Public key of the group.
    pub join_key: String,
    /// Secret proving membership.
    pub join_secret: String,
}

impl ComputeGroup {
    /// Creates a compute group reference.
    pub fn new(join_key: impl Into<String>, join_secret: impl Into<String>) -> Self {
        Self {
            join_key: join_key.into(),
            join_secret: join_secret.into(),
        }
    }
}

impl fmt::Debug for ComputeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeGroup")
            .field("join_key", &self.join_key)
            .field("join_secret", &"***")
            .finish()
    }
}
