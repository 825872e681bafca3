//! Session-affinity management.
//!
//! The worker is stateful across invocations: resuming without a valid
//! prior session produces protocol errors, so continuity is tracked
//! authoritatively here rather than inferred per call site.

use tokio::sync::Mutex;
use tracing::info;

use crate::models::session::Session;

/// Holds the one current [`Session`] and decides whether the next job
/// starts a new worker session or resumes the existing one.
#[derive(Debug)]
pub struct SessionManager {
    current: Mutex<Session>,
}

impl SessionManager {
    /// Create a manager holding a fresh, not-yet-started session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Session::fresh()),
        }
    }

    /// Snapshot of the current session.
    pub async fn current(&self) -> Session {
        self.current.lock().await.clone()
    }

    /// Record that the worker completed a job under the current session;
    /// subsequent jobs must resume rather than create.
    pub async fn mark_started(&self) {
        self.current.lock().await.started = true;
    }

    /// Discard the current session and allocate a fresh identifier.
    ///
    /// Returns the new session for display/acknowledgement.
    pub async fn reset(&self) -> Session {
        let fresh = Session::fresh();
        *self.current.lock().await = fresh.clone();
        info!(session_id = %fresh.id, "session reset");
        fresh
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
