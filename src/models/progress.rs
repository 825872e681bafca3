//! Outbound wire frames pushed to chat consumers.

use serde::{Deserialize, Serialize};

use crate::models::job::QueueEntry;
use crate::protocol::event::EditInfo;

/// Job lifecycle milestone, distinct from the final chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "progress_type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Worker processing began for a job.
    Start {
        /// Human-readable announcement.
        message: String,
    },
    /// Worker startup banner.
    Init {
        /// Model name reported by the worker.
        model: String,
        /// Session identifier the worker bound to.
        session_id: String,
    },
    /// A tool invocation began.
    ToolStart {
        /// 1-based tool turn within the job.
        turn: u32,
        /// Tool name.
        tool: String,
        /// Tool-specific one-line summary.
        detail: String,
        /// Structured payload for edit-like tools.
        #[serde(skip_serializing_if = "Option::is_none")]
        edit_info: Option<EditInfo>,
    },
    /// A tool invocation finished.
    ToolEnd {
        /// Turn the result belongs to.
        turn: u32,
        /// Line count when the result carries file metadata.
        #[serde(skip_serializing_if = "Option::is_none")]
        lines: Option<u64>,
    },
    /// Job completed with run totals.
    Complete {
        /// Run duration in seconds.
        duration_sec: f64,
        /// Total cost in USD.
        cost_usd: f64,
        /// Cost converted to the configured local currency.
        cost_local: f64,
        /// ISO code of the local currency.
        currency: String,
        /// Input tokens, including cache reads.
        input_tokens: u64,
        /// Output tokens produced.
        output_tokens: u64,
        /// Total tool turns.
        turns: u32,
    },
    /// Job terminated with an error.
    Error {
        /// Human-readable failure description.
        message: String,
    },
    /// Job is being re-dispatched under a fresh session.
    Retry {
        /// Human-readable retry announcement.
        message: String,
    },
}

/// One frame on the consumer-facing wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// A chat message, from a human or from the agent identity.
    Message {
        /// Sending identity.
        username: String,
        /// Message text.
        message: String,
    },
    /// Server-side announcement (connection, session resets).
    System {
        /// Announcement text.
        message: String,
    },
    /// Snapshot of the pending queue.
    QueueStatus {
        /// Number of pending jobs.
        count: usize,
        /// Pending jobs in enqueue order, with message previews.
        items: Vec<QueueEntry>,
    },
    /// Job lifecycle progress.
    Progress {
        /// The milestone payload.
        #[serde(flatten)]
        event: ProgressEvent,
    },
}

impl From<ProgressEvent> for OutboundFrame {
    fn from(event: ProgressEvent) -> Self {
        Self::Progress { event }
    }
}
