//! Typed events decoded from the worker's structured output stream.

use serde::{Deserialize, Serialize};

/// Structured payload attached to a `tool_start` progress event for tools
/// whose input is worth showing in full (up to the snippet cap) rather than
/// as a one-line detail string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditInfo {
    /// In-place file edit: before/after text snippets.
    Edit {
        /// Root-relative file path.
        file: String,
        /// Replaced text, capped at the snippet budget.
        old: String,
        /// Replacement text, capped at the snippet budget.
        new: String,
    },
    /// Whole-file write: leading content snippet.
    Write {
        /// Root-relative file path.
        file: String,
        /// File content, capped at the snippet budget.
        content: String,
    },
    /// Checklist update: the raw item list for display.
    Todo {
        /// Raw checklist items as emitted by the worker.
        todos: serde_json::Value,
    },
    /// Multiple-choice query: the raw question list for display.
    Questions {
        /// Raw questions as emitted by the worker.
        questions: serde_json::Value,
    },
}

/// One semantic occurrence decoded from a worker output line.
///
/// A single line may decode to several events (an `assistant` envelope can
/// carry multiple content items); malformed lines decode to none.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Worker startup banner: model identity and the session it runs under.
    Init {
        /// Model name reported by the worker.
        model: String,
        /// Session identifier the worker bound to.
        session_id: String,
    },
    /// A tool invocation began.
    ToolStart {
        /// 1-based tool invocation counter within the job.
        turn: u32,
        /// Tool name as reported by the worker.
        tool: String,
        /// Tool-specific one-line summary; empty for unrecognized tools.
        detail: String,
        /// Structured payload for edit-like tools.
        edit_info: Option<EditInfo>,
    },
    /// A tool invocation finished.
    ToolEnd {
        /// Turn the result belongs to.
        turn: u32,
        /// Line count, when the result carries file metadata.
        lines: Option<u64>,
    },
    /// Intermediate answer text. Each occurrence overwrites the previous
    /// one — last write wins, not concatenation.
    Text {
        /// Full text of this assistant message.
        content: String,
    },
    /// Terminal success marker with run totals.
    Result {
        /// Total tool turns reported by the worker.
        turns: u32,
        /// Run duration in milliseconds.
        duration_ms: u64,
        /// Total cost in USD.
        cost_usd: f64,
        /// Fresh input tokens consumed.
        input_tokens: u64,
        /// Output tokens produced.
        output_tokens: u64,
        /// Input tokens served from cache.
        cache_read_tokens: u64,
        /// Authoritative final answer, overriding any prior [`Self::Text`].
        text: Option<String>,
    },
}
