//! Decision oracle integration module
//!
//! This module provides the chat client used to ask the LLM what to do
//! next, the wire types it speaks, and the decision step that turns one
//! question plus history into one raw [`OracleOutput`].

pub mod client;
pub mod decision;
pub mod output;
pub mod tool_use;

// Re-export public types so other modules can do `use crate::oracle::ChatClient`
pub use client::{ChatClient, ChunkStream, StreamChunk};
pub use decision::{DecisionEvent, DecisionOracle, DecisionStep, OracleError};
pub use output::OracleOutput;
pub use tool_use::{ChatMessage, ChatResponse, NativeFunction, NativeToolCall, Tool, ToolFunction};
