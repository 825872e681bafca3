//! Stream translator: one worker output line → typed protocol events.
//!
//! Parses each newline-delimited JSON record from the worker's primary
//! output stream and derives the progress summary shown to chat consumers.
//! Lines that do not parse are protocol noise, not business errors — they
//! are logged at `DEBUG` and dropped without surfacing to users.
//!
//! # Known record kinds
//!
//! | `type`          | Maps to                                         |
//! |-----------------|-------------------------------------------------|
//! | `system` (init) | [`ProtocolEvent::Init`]                         |
//! | `assistant`     | [`ProtocolEvent::ToolStart`] / [`ProtocolEvent::Text`] per content item |
//! | `user`          | [`ProtocolEvent::ToolEnd`] when a tool result is attached |
//! | `result`        | [`ProtocolEvent::Result`] (terminal success marker) |
//! | *(any other)*   | Skipped; logged at `DEBUG`                      |

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::protocol::event::{EditInfo, ProtocolEvent};

/// Character budget for one-line detail strings (commands, patterns).
pub const DETAIL_MAX_CHARS: usize = 100;

/// Character budget for structured text snippets (edit before/after,
/// written file content).
pub const SNIPPET_MAX_CHARS: usize = 500;

// ── Wire format ──────────────────────────────────────────────────────────────

/// Top-level worker output record (one JSON object per line).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireRecord {
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        model: String,
        #[serde(default)]
        session_id: String,
    },
    Assistant {
        message: WireMessage,
    },
    User {
        #[serde(default)]
        tool_use_result: Option<Value>,
    },
    Result {
        #[serde(default)]
        num_turns: u32,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        total_cost_usd: f64,
        #[serde(default)]
        usage: WireUsage,
        #[serde(default)]
        result: Option<String>,
    },
}

/// Message body of an `assistant` record.
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Vec<WireContent>,
}

/// One content item inside an `assistant` message.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContent {
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    /// Content kinds this relay does not surface (e.g. thinking blocks).
    #[serde(other)]
    Other,
}

/// Token usage block of a `result` record.
#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
}

// ── Translator ───────────────────────────────────────────────────────────────

/// Per-job stream decoder.
///
/// Holds the job's tool-turn counter and the project root used to rewrite
/// absolute file paths to root-relative display form. Create one per job;
/// the counter must not survive across jobs.
#[derive(Debug)]
pub struct StreamTranslator {
    project_root: PathBuf,
    turn: u32,
}

impl StreamTranslator {
    /// Create a translator rooted at `project_root`.
    #[must_use]
    pub fn new(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            turn: 0,
        }
    }

    /// Decode one output line into zero or more protocol events.
    ///
    /// Malformed or unrecognized lines yield an empty vector; an
    /// `assistant` envelope yields one event per recognized content item.
    pub fn decode(&mut self, line: &str) -> Vec<ProtocolEvent> {
        if line.trim().is_empty() {
            return Vec::new();
        }

        let record: WireRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                debug!(%err, "skipping unparseable worker line");
                return Vec::new();
            }
        };

        match record {
            WireRecord::System {
                subtype,
                model,
                session_id,
            } => {
                if subtype == "init" {
                    vec![ProtocolEvent::Init { model, session_id }]
                } else {
                    Vec::new()
                }
            }
            WireRecord::Assistant { message } => self.decode_assistant(message),
            WireRecord::User { tool_use_result } => self.decode_user(tool_use_result),
            WireRecord::Result {
                num_turns,
                duration_ms,
                total_cost_usd,
                usage,
                result,
            } => vec![ProtocolEvent::Result {
                turns: num_turns,
                duration_ms,
                cost_usd: total_cost_usd,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cache_read_tokens: usage.cache_read_input_tokens,
                text: result,
            }],
        }
    }

    fn decode_assistant(&mut self, message: WireMessage) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        for item in message.content {
            match item {
                WireContent::ToolUse { name, input } => {
                    self.turn += 1;
                    events.push(self.tool_start(name, &input));
                }
                WireContent::Text { text } => {
                    events.push(ProtocolEvent::Text { content: text });
                }
                WireContent::Other => {}
            }
        }
        events
    }

    fn decode_user(&self, tool_use_result: Option<Value>) -> Vec<ProtocolEvent> {
        let Some(result) = tool_use_result else {
            return Vec::new();
        };

        // Empty results carry nothing worth reporting.
        let empty = result.is_null()
            || result.as_object().is_some_and(serde_json::Map::is_empty)
            || result.as_array().is_some_and(Vec::is_empty);
        if empty {
            return Vec::new();
        }

        let lines = result
            .get("file")
            .and_then(|file| file.get("numLines"))
            .and_then(Value::as_u64);

        vec![ProtocolEvent::ToolEnd {
            turn: self.turn,
            lines,
        }]
    }

    /// Derive the display detail (and optional structured payload) for one
    /// tool invocation. Unrecognized tool names yield an empty detail.
    fn tool_start(&self, tool: String, input: &Value) -> ProtocolEvent {
        let mut edit_info = None;

        let detail = match tool.as_str() {
            "Read" => self.normalize_path(str_field(input, "file_path")),
            "Bash" => truncate(str_field(input, "command"), DETAIL_MAX_CHARS),
            "Grep" => truncate(str_field(input, "pattern"), DETAIL_MAX_CHARS),
            "Edit" => {
                let file = self.normalize_path(str_field(input, "file_path"));
                let old = str_field(input, "old_string");
                let new = str_field(input, "new_string");
                if !old.is_empty() || !new.is_empty() {
                    edit_info = Some(EditInfo::Edit {
                        file: file.clone(),
                        old: truncate(old, SNIPPET_MAX_CHARS),
                        new: truncate(new, SNIPPET_MAX_CHARS),
                    });
                }
                file
            }
            "Write" => {
                let file = self.normalize_path(str_field(input, "file_path"));
                let content = str_field(input, "content");
                if !content.is_empty() {
                    edit_info = Some(EditInfo::Write {
                        file: file.clone(),
                        content: truncate(content, SNIPPET_MAX_CHARS),
                    });
                }
                file
            }
            "TodoWrite" => match input.get("todos").and_then(Value::as_array) {
                Some(todos) if !todos.is_empty() => {
                    let detail = format!("{} items", todos.len());
                    edit_info = Some(EditInfo::Todo {
                        todos: Value::Array(todos.clone()),
                    });
                    detail
                }
                _ => String::new(),
            },
            "AskUserQuestion" => match input.get("questions").and_then(Value::as_array) {
                Some(questions) if !questions.is_empty() => {
                    let detail = format!("{} questions", questions.len());
                    edit_info = Some(EditInfo::Questions {
                        questions: Value::Array(questions.clone()),
                    });
                    detail
                }
                _ => String::new(),
            },
            _ => String::new(),
        };

        ProtocolEvent::ToolStart {
            turn: self.turn,
            tool,
            detail,
            edit_info,
        }
    }

    /// Rewrite an absolute path under the project root to root-relative
    /// form with forward-slash separators; paths outside the root pass
    /// through unchanged.
    fn normalize_path(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }

        match Path::new(raw).strip_prefix(&self.project_root) {
            Ok(relative) => relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => raw.to_owned(),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Extract a string field from a tool input object, defaulting to `""`.
fn str_field<'a>(input: &'a Value, key: &str) -> &'a str {
    input.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Cap `text` at `max_chars` characters, appending `…` when truncated.
///
/// Text at or below the cap passes through unchanged. This is a display
/// convenience; structured payload fields keep their own larger budget.
#[must_use]
pub fn truncate(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
