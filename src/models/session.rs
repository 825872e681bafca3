//! Worker session identity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A worker-side conversational context.
///
/// `started` flips to `true` after the worker completes its first job under
/// this identifier; from then on jobs must *resume* the session rather than
/// create it. Allocating a new identifier always clears `started`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Opaque session token passed to the worker.
    pub id: String,
    /// Whether the worker has completed at least one job under this token.
    pub started: bool,
}

impl Session {
    /// Allocate a fresh session with a new opaque identifier.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started: false,
        }
    }

    /// Short identifier prefix for acknowledgement messages.
    #[must_use]
    pub fn short_id(&self) -> String {
        self.id.chars().take(8).collect()
    }
}
