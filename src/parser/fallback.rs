//! Text mining for oracle output that is not valid JSON
//!
//! Models routinely emit almost-JSON: string values with unescaped quotes,
//! `name`/`arguments` pairs scattered through prose, or a Python-style
//! `create_order(customer="ann", quantity=2)` call. These helpers recover
//! what they can.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::scan;
use super::shapes::decode_arguments;
use crate::agent::call::{Arguments, ToolCall};

lazy_static! {
    /// `ChatCompletionMessageToolCall(id=...)` style object reprs
    static ref REPR_CONSTRUCTOR: Regex =
        Regex::new(r"^\[?\s*[A-Z][a-z0-9]+(?:[A-Z][A-Za-z0-9]*)+\(").expect("valid regex");
    /// `<module.Class object at 0x7f...>`
    static ref REPR_OBJECT: Regex =
        Regex::new(r"<[A-Za-z_][\w.]* object at 0x[0-9a-fA-F]+>").expect("valid regex");
    static ref NAME_FIELD: Regex =
        Regex::new(r#""name"\s*:\s*"([^"]+)""#).expect("valid regex");
    static ref ARGUMENTS_FIELD: Regex =
        Regex::new(r#""(?:arguments|parameters)"\s*:\s*"#).expect("valid regex");
    static ref JSON_STRING: Regex =
        Regex::new(r#"^"(?:[^"\\]|\\.)*""#).expect("valid regex");
    static ref CALL_EXPRESSION: Regex =
        Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\(([^()]*)\)").expect("valid regex");
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid regex");
}

/// Whether the text is a stringified programmatic object rather than JSON or prose
pub fn looks_like_repr(text: &str) -> bool {
    let trimmed = text.trim_start();
    REPR_CONSTRUCTOR.is_match(trimmed) || REPR_OBJECT.is_match(trimmed)
}

/// Escape double quotes that cannot end a JSON string
///
/// Inside a string, a quote only closes it when the next non-blank
/// character is `,`, `:`, `}`, `]` or the end of input; any other quote
/// is taken as content and escaped. Returns `None` if nothing changed.
pub fn repair_unescaped_quotes(candidate: &str) -> Option<String> {
    let chars: Vec<char> = candidate.chars().collect();
    let mut repaired = String::with_capacity(candidate.len() + 8);
    let mut in_string = false;
    let mut changed = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            repaired.push(c);
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                repaired.push(c);
                if let Some(next) = chars.get(i + 1) {
                    repaired.push(*next);
                }
                i += 2;
                continue;
            }
            '"' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                match next {
                    None | Some(',') | Some(':') | Some('}') | Some(']') => {
                        in_string = false;
                        repaired.push(c);
                    }
                    Some(_) => {
                        repaired.push_str("\\\"");
                        changed = true;
                    }
                }
            }
            '\n' => {
                repaired.push_str("\\n");
                changed = true;
            }
            _ => repaired.push(c),
        }
        i += 1;
    }

    changed.then_some(repaired)
}

/// Decode a candidate object, repairing unescaped quotes if needed
pub fn decode_lenient(candidate: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }
    let fixed = repair_unescaped_quotes(candidate)?;
    serde_json::from_str(&fixed).ok()
}

/// `"name": "..."` fields with the `"arguments"` that follow them
///
/// Each name's arguments are searched only up to the next name field.
pub fn name_argument_pairs(text: &str) -> Vec<ToolCall> {
    let names: Vec<(usize, usize, &str)> = NAME_FIELD
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            Some((whole.start(), whole.end(), name))
        })
        .collect();

    names
        .iter()
        .enumerate()
        .map(|(idx, (_, end, name))| {
            let region_end = names.get(idx + 1).map(|n| n.0).unwrap_or(text.len());
            let region = &text[*end..region_end];
            ToolCall::new(name.trim(), arguments_in(region))
        })
        .filter(|call| !call.name.is_empty())
        .collect()
}

fn arguments_in(region: &str) -> Arguments {
    let Some(field) = ARGUMENTS_FIELD.find(region) else {
        return Arguments::new();
    };
    let rest = region[field.end()..].trim_start();

    if rest.starts_with('{') {
        return scan::leading_object(rest)
            .and_then(decode_lenient)
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();
    }

    // JSON-encoded argument string
    JSON_STRING
        .find(rest)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .map(|value| decode_arguments(Some(&value)))
        .unwrap_or_default()
}

/// `function_name(key=value, ...)` call expressions
///
/// The `(` must follow the name directly. Accepted when the argument list has `key=value` pairs, or is empty and
/// the name is snake_case with an underscore (so prose like "(see above)"
/// is not taken as a call).
pub fn call_expressions(text: &str) -> Vec<ToolCall> {
    CALL_EXPRESSION
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let args = caps.get(2)?.as_str().trim();
            if args.is_empty() {
                let snake = name.contains('_') && !name.chars().any(|c| c.is_ascii_uppercase());
                return snake.then(|| ToolCall::bare(name));
            }
            if !args.contains('=') {
                return None;
            }
            Some(ToolCall::new(name, keyword_arguments(args)))
        })
        .collect()
}

/// Parse `key=value, key2="a, b"` into a mapping
fn keyword_arguments(args: &str) -> Arguments {
    let mut map = Arguments::new();
    for part in split_top_level(args) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !IDENTIFIER.is_match(key) {
            continue;
        }
        map.insert(key.to_string(), literal_value(value.trim()));
    }
    map
}

/// Split on commas outside quotes and brackets
fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in args.char_indices() {
        match (quote, c) {
            (Some(q), ch) if ch == q => {
                // A quote followed by more text before the next comma is content
                let tail = args[i + c.len_utf8()..].trim_start();
                if tail.is_empty() || tail.starts_with(',') {
                    quote = None;
                }
            }
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '[') | (None, '{') => depth += 1,
            (None, ']') | (None, '}') => depth -= 1,
            (None, ',') if depth <= 0 => {
                parts.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&args[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// Value of one keyword argument
fn literal_value(raw: &str) -> Value {
    for q in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(q) && raw.ends_with(q) {
            return Value::String(raw[1..raw.len() - 1].to_string());
        }
    }
    match raw {
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        "None" => return Value::Null,
        _ => {}
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
