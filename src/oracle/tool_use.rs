//! Chat wire types with tool calling support
//!
//! These mirror Ollama's `/api/chat` message format, which is close enough
//! to the OpenAI chat format that both servers' replies deserialize into
//! them. Native tool-call arguments are kept as raw JSON: Ollama sends an
//! object, OpenAI-style servers send a JSON-encoded string. The parser
//! normalizes both.

use serde::{Deserialize, Deserializer, Serialize};

use crate::mcp::ToolDescriptor;

/// A message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String, // "system", "user", "assistant", "tool"
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<NativeToolCall>>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            tool_calls: None,
        }
    }
}

/// OpenAI-style servers send `"content": null` next to tool calls
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A tool call in the model's native format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub call_type: Option<String>,
    pub function: NativeFunction,
}

impl NativeToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: None,
            call_type: Some("function".to_string()),
            function: NativeFunction {
                name: name.into(),
                arguments,
            },
        }
    }
}

/// Function call details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeFunction {
    #[serde(default)]
    pub name: String,
    /// Object or JSON-encoded string, depending on the server
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Tool definition for the model
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String, // Always "function"
    pub function: ToolFunction,
}

impl Tool {
    /// Declare a provider tool to the model
    pub fn from_descriptor(descriptor: &ToolDescriptor) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: ToolFunction {
                name: descriptor.name.clone(),
                description: descriptor.description.clone(),
                parameters: descriptor.parameter_schema.clone(),
            },
        }
    }
}

/// Function specification for a tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value, // JSON Schema
}

/// Response from /api/chat
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub message: ChatMessage,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: u32,
    #[serde(default)]
    pub eval_duration: u64,
}

/// Default system prompt for the order-processing agent
pub const DEFAULT_AGENT_SYSTEM_PROMPT: &str = r#"You are an order processing assistant. You read customer requests (often emails) and fulfil them with the storefront tools you are given.

Guidelines:
- Be precise with quantities, product names and prices
- Look items up before adding them to an order
- Call tools through the tool-calling interface, or reply with {"tool_calls": [{"function": {"name": ..., "arguments": {...}}}]}
- You may call several tools at once; they run in the order you list them
- Read the results of previous calls before deciding what to do next
- When the request is fully handled, reply in plain text without calling any tool"#;

/// Build the user message for one decision
///
/// The message carries the question, the tool catalogue and, once tools
/// have been called, the rendered history section.
pub fn build_decision_prompt(question: &str, tools: &[ToolDescriptor], history_section: &str) -> String {
    let mut prompt = format!("Request:\n{}\n\nAvailable tools:\n", question.trim());
    if tools.is_empty() {
        prompt.push_str("(none)\n");
    }
    for tool in tools {
        if tool.description.is_empty() {
            prompt.push_str(&format!("- {}\n", tool.name));
        } else {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
    }
    if !history_section.is_empty() {
        prompt.push('\n');
        prompt.push_str(history_section);
        prompt.push('\n');
    }
    prompt
}
