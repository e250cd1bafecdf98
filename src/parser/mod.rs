//! Canonical tool-call parser
//!
//! Turns whatever the oracle produced into an ordered list of
//! [`ToolCall`]s, or a [`ParseFailure`] describing why there is nothing to
//! run. Parsing never panics and never errors out of the loop.
//!
//! Shapes are tried from most to least structured:
//!
//! ```text
//! NativeCalls ──────────────────────────────► calls
//! Mapping ── tool_calls / function / legacy ► calls
//! Text / Fragments
//!   ├─ programmatic repr? ─────────────────► ParseFailure::ReprOutput
//!   ├─ whole text is JSON ─────────────────► calls
//!   ├─ balanced {...} candidates, last first► calls
//!   ├─ some JSON decoded, none recognized ─► ParseFailure::NoToolCalls
//!   └─ fallback: repaired JSON, name/arguments pairs, f(k=v) expressions
//! nothing ─────────────────────────────────► ParseFailure::NoToolCalls
//! ```
//!
//! `{"tool_calls": []}` is an explicit completion and parses to an empty
//! list.

pub mod fallback;
pub mod scan;
pub mod shapes;

use std::fmt;

use serde_json::Value;
use tracing::debug;

use crate::agent::call::ToolCall;
use crate::oracle::OracleOutput;

/// Failure string when the output names no tools
pub const NO_TOOLS_CALLED: &str = "No tools called or could not parse tool calls";

/// Failure string when the output is a stringified object instead of JSON
pub const REPR_OUTPUT: &str =
    "Oracle output is a programmatic repr of tool-call objects, not JSON; the oracle adapter is not serializing tool calls";

/// Why a decision yielded no calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// Nothing actionable in the output
    NoToolCalls,
    /// The output is a language-level object repr: an upstream format bug
    ReprOutput,
    /// The oracle call failed before producing output
    Upstream(String),
}

impl ParseFailure {
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseFailure::NoToolCalls => f.write_str(NO_TOOLS_CALLED),
            ParseFailure::ReprOutput => f.write_str(REPR_OUTPUT),
            ParseFailure::Upstream(msg) => write!(f, "Oracle call failed: {}", msg),
        }
    }
}

/// Parse one oracle output
///
/// `streamed_text` is the text accumulated from a streamed decision, if
/// any. It is mined only when the structured output names no calls.
pub fn parse(output: &OracleOutput, streamed_text: Option<&str>) -> Result<Vec<ToolCall>, ParseFailure> {
    let structured = match output {
        OracleOutput::NativeCalls(calls) => calls.iter().map(shapes::from_native).collect(),
        OracleOutput::Mapping(map) => {
            let value = Value::Object(map.clone());
            if shapes::is_explicit_completion(&value) {
                return Ok(Vec::new());
            }
            shapes::calls_from_value(&value)
        }
        OracleOutput::Text(text) => return parse_text(text),
        OracleOutput::Fragments(fragments) => return parse_text(&fragments.concat()),
        OracleOutput::Failure(msg) => return Err(ParseFailure::Upstream(msg.clone())),
    };

    if !structured.is_empty() {
        debug!(shape = output.shape(), calls = structured.len(), "Parsed structured tool calls");
        return Ok(structured);
    }
    match streamed_text {
        Some(text) if !text.trim().is_empty() => parse_text(text),
        _ => Err(ParseFailure::NoToolCalls),
    }
}

/// Parse free text that may embed tool calls
pub fn parse_text(text: &str) -> Result<Vec<ToolCall>, ParseFailure> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseFailure::NoToolCalls);
    }

    // Checked before any JSON decoding: a repr is an upstream bug to surface
    if fallback::looks_like_repr(trimmed) {
        return Err(ParseFailure::ReprOutput);
    }

    let mut decoded = false;
    if let Ok(value) = serde_json::from_str::<Value>(strip_code_fence(trimmed)) {
        if let Some(calls) = recognize(&value) {
            debug!(calls = calls.len(), "Parsed tool calls from JSON text");
            return Ok(calls);
        }
        decoded = true;
    }

    // Later JSON in a response is taken as more authoritative
    for candidate in scan::object_candidates(trimmed).into_iter().rev() {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if let Some(calls) = recognize(&value) {
                debug!(calls = calls.len(), "Parsed tool calls from embedded JSON");
                return Ok(calls);
            }
            decoded = true;
        }
    }

    // Well-formed JSON that names no calls is an answer, not something to mine
    if decoded {
        return Err(ParseFailure::NoToolCalls);
    }

    let calls = mine_text(trimmed);
    if calls.is_empty() {
        Err(ParseFailure::NoToolCalls)
    } else {
        debug!(calls = calls.len(), "Recovered tool calls from malformed text");
        Ok(calls)
    }
}

/// Calls named by a decoded value; an explicit completion names none
fn recognize(value: &Value) -> Option<Vec<ToolCall>> {
    if shapes::is_explicit_completion(value) {
        return Some(Vec::new());
    }
    let calls = shapes::calls_from_value(value);
    (!calls.is_empty()).then_some(calls)
}

fn mine_text(text: &str) -> Vec<ToolCall> {
    for candidate in scan::loose_object_candidates(text).into_iter().rev() {
        if let Some(value) = fallback::decode_lenient(candidate) {
            let calls = shapes::calls_from_value(&value);
            if !calls.is_empty() {
                return calls;
            }
        }
    }

    let pairs = fallback::name_argument_pairs(text);
    if !pairs.is_empty() {
        return pairs;
    }
    fallback::call_expressions(text)
}

/// Inner text of a ```json fenced block, or the text itself
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
