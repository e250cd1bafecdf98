//! The raw result of one decision
//!
//! Oracles answer in incompatible shapes. The shape is decided once, when
//! the reply crosses into the agent, and the parser then matches on this
//! closed set instead of inspecting values at runtime.

use serde_json::{Map, Value};

use super::tool_use::{ChatMessage, NativeToolCall};

#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutput {
    /// Provider-native tool-call objects
    NativeCalls(Vec<NativeToolCall>),
    /// A decoded JSON object, usually carrying a `tool_calls` key
    Mapping(Map<String, Value>),
    /// Free text, possibly embedding JSON
    Text(String),
    /// Incremental text fragments from a streamed decision, in arrival order
    Fragments(Vec<String>),
    /// The oracle call itself failed
    Failure(String),
}

impl OracleOutput {
    /// Classify an arbitrary JSON value returned by an oracle
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => OracleOutput::Mapping(map),
            Value::String(text) => OracleOutput::Text(text),
            Value::Array(items) => {
                let calls: Result<Vec<NativeToolCall>, _> = items
                    .iter()
                    .cloned()
                    .map(serde_json::from_value)
                    .collect();
                match calls {
                    Ok(calls) => OracleOutput::NativeCalls(calls),
                    Err(_) => OracleOutput::Text(Value::Array(items).to_string()),
                }
            }
            other => OracleOutput::Text(other.to_string()),
        }
    }

    /// Classify an assistant chat message: native calls win over text
    ///
    /// Content that is a whole JSON object or array is classified as a
    /// value; anything else stays text.
    pub fn from_message(message: ChatMessage) -> Self {
        if let Some(calls) = message.tool_calls.filter(|calls| !calls.is_empty()) {
            return OracleOutput::NativeCalls(calls);
        }
        match serde_json::from_str::<Value>(message.content.trim()) {
            Ok(value @ (Value::Object(_) | Value::Array(_))) => OracleOutput::from_value(value),
            _ => OracleOutput::Text(message.content),
        }
    }

    /// Short label used for logging and metrics
    pub fn shape(&self) -> &'static str {
        match self {
            OracleOutput::NativeCalls(_) => "native",
            OracleOutput::Mapping(_) => "mapping",
            OracleOutput::Text(_) => "text",
            OracleOutput::Fragments(_) => "stream",
            OracleOutput::Failure(_) => "failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_shapes() {
        assert_eq!(
            OracleOutput::from_value(json!({"tool_calls": []})).shape(),
            "mapping"
        );
        assert_eq!(OracleOutput::from_value(json!("hi")).shape(), "text");
        assert_eq!(
            OracleOutput::from_value(json!([{"function": {"name": "a", "arguments": "{}"}}])).shape(),
            "native"
        );
        // Arrays that are not native calls are mined as text
        assert_eq!(OracleOutput::from_value(json!([1, 2])).shape(), "text");
    }

    #[test]
    fn test_from_message_prefers_native_calls() {
        let mut msg = ChatMessage::assistant("I'll create an order");
        msg.tool_calls = Some(vec![NativeToolCall::new("create_order", json!({}))]);
        assert!(matches!(OracleOutput::from_message(msg), OracleOutput::NativeCalls(c) if c.len() == 1));

        let mut msg = ChatMessage::assistant("done");
        msg.tool_calls = Some(vec![]);
        assert_eq!(OracleOutput::from_message(msg), OracleOutput::Text("done".to_string()));
    }

    #[test]
    fn test_from_message_classifies_json_content() {
        let msg = ChatMessage::assistant(r#" {"tool_calls": []} "#);
        assert_eq!(OracleOutput::from_message(msg).shape(), "mapping");

        let msg = ChatMessage::assistant(r#"[{"function": {"name": "create_order", "arguments": "{}"}}]"#);
        assert_eq!(OracleOutput::from_message(msg).shape(), "native");

        // Prose around JSON is still text
        let msg = ChatMessage::assistant(r#"Done: {"order_id": 1}"#);
        assert_eq!(OracleOutput::from_message(msg).shape(), "text");
        assert_eq!(OracleOutput::from_message(ChatMessage::assistant("42")).shape(), "text");
    }
}
