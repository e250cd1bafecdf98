//! Capability provider integration
//!
//! The agent loop only sees the [`CapabilityProvider`] trait: a catalogue of
//! named tools and a way to invoke one. [`McpClient`] implements it over the
//! MCP JSON-RPC protocol; tests plug in their own providers.

pub mod client;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::agent::call::Arguments;

pub use client::McpClient;

/// A tool as declared by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub parameter_schema: Value,
}

fn empty_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Errors raised by a capability provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Request error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Tool reported an error: {0}")]
    ToolReported(String),
    #[error("Tool {tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },
}

/// External registry of invocable tools
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Current tool catalogue
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError>;

    /// Invoke a tool by name, returning its text payload
    async fn invoke(&self, name: &str, arguments: &Arguments) -> Result<String, ProviderError>;
}
