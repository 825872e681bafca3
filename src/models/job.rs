//! Job and queue-snapshot models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::translator::truncate;

/// Character budget for a queued message preview in a snapshot.
pub const PREVIEW_MAX_CHARS: usize = 50;

/// One request for the worker, from submission to terminal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Chat identity that submitted the message.
    pub sender: String,
    /// Full message text.
    pub message: String,
    /// Time the job entered the queue.
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    /// Construct a job stamped with the current time.
    #[must_use]
    pub fn new(sender: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            message: message.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// Prompt line delivered to the worker for this job.
    #[must_use]
    pub fn prompt(&self) -> String {
        format!("[{}]: {}", self.sender, self.message)
    }
}

/// One not-yet-dispatched entry in a queue snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntry {
    /// Submitting chat identity.
    pub sender: String,
    /// Message preview, capped at [`PREVIEW_MAX_CHARS`].
    pub message: String,
}

/// Derived view of the pending queue, recomputed on every mutation and
/// pushed to consumers; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Number of pending jobs.
    pub count: usize,
    /// Pending jobs in enqueue order.
    pub items: Vec<QueueEntry>,
}

impl QueueSnapshot {
    /// Build a snapshot from the pending jobs in enqueue order.
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let items: Vec<QueueEntry> = jobs
            .into_iter()
            .map(|job| QueueEntry {
                sender: job.sender.clone(),
                message: truncate(&job.message, PREVIEW_MAX_CHARS),
            })
            .collect();
        Self {
            count: items.len(),
            items,
        }
    }
}
