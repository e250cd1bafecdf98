//! Recognizers for the JSON shapes oracles use to name tool calls

use serde_json::{Map, Value};

use crate::agent::call::{Arguments, ToolCall};
use crate::oracle::tool_use::NativeToolCall;

/// Decode call arguments
///
/// Objects pass through; strings are decoded as JSON objects. Anything
/// else, including a string that fails to decode, becomes an empty
/// mapping so the call itself survives.
pub fn decode_arguments(value: Option<&Value>) -> Arguments {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => Arguments::new(),
        },
        _ => Arguments::new(),
    }
}

/// Canonical form of a provider-native call
pub fn from_native(call: &NativeToolCall) -> ToolCall {
    ToolCall::new(
        call.function.name.clone(),
        decode_arguments(Some(&call.function.arguments)),
    )
}

/// Calls named by a decoded JSON value, in order
///
/// Objects are checked for, in order: a `tool_calls` list, a single
/// `function` pair, a legacy `selected_tools`/`tools` list, and a bare
/// `name`. Arrays are read as lists of call items.
pub fn calls_from_value(value: &Value) -> Vec<ToolCall> {
    match value {
        Value::Array(items) => calls_from_items(items),
        Value::Object(map) => calls_from_object(map),
        _ => Vec::new(),
    }
}

/// `{"tool_calls": []}`: the oracle stating that nothing is left to call
pub fn is_explicit_completion(value: &Value) -> bool {
    matches!(value.get("tool_calls"), Some(Value::Array(items)) if items.is_empty())
}

fn calls_from_object(map: &Map<String, Value>) -> Vec<ToolCall> {
    if let Some(Value::Array(items)) = map.get("tool_calls") {
        return calls_from_items(items);
    }

    if let Some(function) = map.get("function").and_then(Value::as_object) {
        if let Some(call) = named_call(function) {
            return vec![call];
        }
    }

    for key in ["selected_tools", "tools"] {
        if let Some(Value::Array(items)) = map.get(key) {
            let calls = calls_from_items(items);
            if !calls.is_empty() {
                return calls;
            }
        }
    }

    named_call(map).into_iter().collect()
}

fn calls_from_items(items: &[Value]) -> Vec<ToolCall> {
    items.iter().filter_map(call_from_item).collect()
}

/// One list element: a native call, a `{name, arguments}` object, or a bare name
fn call_from_item(item: &Value) -> Option<ToolCall> {
    match item {
        Value::String(name) if !name.trim().is_empty() => Some(ToolCall::bare(name.trim())),
        Value::Object(map) => match map.get("function").and_then(Value::as_object) {
            Some(function) => Some(ToolCall::new(
                function
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                decode_arguments(function.get("arguments")),
            )),
            None => named_call(map),
        },
        _ => None,
    }
}

/// `{name, arguments}`, also accepting `parameters` or `args` for the arguments
fn named_call(map: &Map<String, Value>) -> Option<ToolCall> {
    let name = map.get("name").and_then(Value::as_str)?;
    if name.trim().is_empty() {
        return None;
    }
    let arguments = ["arguments", "parameters", "args"]
        .iter()
        .find_map(|key| map.get(*key));
    Some(ToolCall::new(name.trim(), decode_arguments(arguments)))
}
