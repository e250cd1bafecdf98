//! Canonical tool-call records shared by the parser, the invoker and the
//! history tracker.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tool arguments, always a JSON object.
pub type Arguments = Map<String, Value>;

/// A format-independent "invoke tool X with arguments Y".
///
/// The name is checked against the provider's catalogue when the call is
/// invoked, not when it is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// A call with no arguments
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, Arguments::new())
    }
}

/// Outcome of a single invocation. Exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok(String),
    Err(String),
}

impl ToolOutcome {
    pub fn is_err(&self) -> bool {
        matches!(self, ToolOutcome::Err(_))
    }

    /// The payload or the error message, whichever is present
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Ok(payload) => payload,
            ToolOutcome::Err(message) => message,
        }
    }
}

/// Result of invoking one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,
    pub arguments: Arguments,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, payload: impl Into<String>) -> Self {
        Self {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            outcome: ToolOutcome::Ok(payload.into()),
        }
    }

    pub fn err(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            name: call.name.clone(),
            arguments: call.arguments.clone(),
            outcome: ToolOutcome::Err(message.into()),
        }
    }

    pub fn is_err(&self) -> bool {
        self.outcome.is_err()
    }
}
