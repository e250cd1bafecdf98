//! Append-only ledger of the tools called while answering one question
//!
//! The rendered ledger re-enters every decision prompt, so its order is the
//! order in which the calls happened.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::call::{Arguments, ToolCall, ToolResult};

/// Pseudo tool name used for failed oracle calls
pub const ORACLE_ENTRY: &str = "oracle";

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub tool: String,
    pub arguments: Arguments,
    #[serde(rename = "isError")]
    pub is_error: bool,
    pub result: String,
}

/// History for a single loop. Entries are never edited or removed.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call and its result, returning the new entry
    pub fn append(&mut self, call: &ToolCall, result: &ToolResult) -> &HistoryEntry {
        self.push(HistoryEntry {
            tool: call.name.clone(),
            arguments: call.arguments.clone(),
            is_error: result.is_err(),
            result: result.outcome.text().to_string(),
        })
    }

    /// Record a failed oracle call
    pub fn append_oracle_failure(&mut self, message: impl Into<String>) -> &HistoryEntry {
        self.push(HistoryEntry {
            tool: ORACLE_ENTRY.to_string(),
            arguments: Arguments::new(),
            is_error: true,
            result: message.into(),
        })
    }

    fn push(&mut self, entry: HistoryEntry) -> &HistoryEntry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JSON array of entries in insertion order
    pub fn render(&self) -> Value {
        Value::Array(
            self.entries
                .iter()
                .map(|entry| serde_json::to_value(entry).unwrap_or(Value::Null))
                .collect(),
        )
    }

    /// Prompt section listing previous calls; empty when nothing was called yet
    pub fn render_prompt_section(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        let rendered =
            serde_json::to_string_pretty(&self.render()).unwrap_or_else(|_| "[]".to_string());
        format!(
            "Previously called tools (oldest first):\n{}\n\nUse these results to decide the next step. If the task is done, call no tools.",
            rendered
        )
    }
}
