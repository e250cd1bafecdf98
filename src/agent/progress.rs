//! Progress notifications: the only thing the loop exposes to its caller

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::history::HistoryEntry;

/// Why a loop stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalReason {
    /// The oracle asked for no further tools
    TaskComplete,
    /// The oracle output held no parseable tool calls; treated as completion
    NoToolCalls { reason: String },
    /// The iteration budget ran out while tools were still being called
    BudgetExhausted,
}

impl TerminalReason {
    /// Whether the oracle itself considered the task done
    pub fn finished_by_oracle(&self) -> bool {
        !matches!(self, TerminalReason::BudgetExhausted)
    }

    /// Metric/log label
    pub fn label(&self) -> &'static str {
        match self {
            TerminalReason::TaskComplete => "task_complete",
            TerminalReason::NoToolCalls { .. } => "no_tool_calls",
            TerminalReason::BudgetExhausted => "budget_exhausted",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            TerminalReason::TaskComplete | TerminalReason::NoToolCalls { .. } => "Task completed",
            TerminalReason::BudgetExhausted => "Iteration budget exhausted",
        }
    }
}

/// What a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// Start of an iteration
    Step,
    /// Text streamed from the oracle
    DecisionChunk,
    /// Calls about to be invoked
    ToolCalls,
    /// Ledger after a batch was recorded
    ToolResults,
    /// Oracle call failed; the loop carries on
    Error,
    /// Final notification
    Complete,
}

/// One step of progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressNotification {
    pub is_task_complete: bool,
    pub require_user_input: bool,
    /// A string or a structured value
    pub content: Value,
    pub kind: ProgressKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_reason: Option<TerminalReason>,
}

impl ProgressNotification {
    pub fn progress(kind: ProgressKind, content: impl Into<Value>) -> Self {
        Self {
            is_task_complete: false,
            require_user_input: false,
            content: content.into(),
            kind,
            terminal_reason: None,
        }
    }

    /// The single terminal notification of a loop
    pub fn complete(reason: TerminalReason, iterations: usize, history: &[HistoryEntry]) -> Self {
        let mut content = json!({
            "message": reason.message(),
            "reason": reason.label(),
            "iterations": iterations,
            "history": history,
        });
        if let TerminalReason::NoToolCalls { reason: why } = &reason {
            content["detail"] = Value::String(why.clone());
        }
        Self {
            is_task_complete: true,
            require_user_input: false,
            content,
            kind: ProgressKind::Complete,
            terminal_reason: Some(reason),
        }
    }

    /// Content as display text: strings as-is, structured values as JSON
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
