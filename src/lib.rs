//! OrderPilot - LLM agent that turns order requests into tool calls
//!
//! A question (typically an email) goes through a bounded loop: the
//! decision oracle picks tools, the parser normalizes whatever shape the
//! oracle answered in, the invoker runs the calls against an MCP capability
//! provider and the results are folded into the next prompt.
//!
//! # Modules
//!
//! - `agent` - Loop controller, history, invoker, progress notifications, inbox ledger
//! - `oracle` - Ollama-compatible chat client and the decision step
//! - `parser` - Canonical tool-call parser for native, mapping and text outputs
//! - `mcp` - Capability provider trait and MCP JSON-RPC client
//! - `config` - Agent configuration from defaults and environment
//! - `metrics` - Prometheus metrics for observability
//! - `tracing` - Logging and OpenTelemetry export
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use orderpilot::{AgentConfig, AgentController, ChatClient, McpClient};
//!
//! let config = AgentConfig::from_env()?;
//! let oracle = Arc::new(ChatClient::new(&config.oracle_url, &config.model));
//! let provider = Arc::new(McpClient::new(&config.mcp_url));
//! let controller = AgentController::new(oracle, provider, config);
//!
//! let outcome = controller.run_to_end("find a red mouse and create an order").await;
//! ```

pub mod agent;
pub mod config;
pub mod mcp;
pub mod metrics;
pub mod oracle;
pub mod parser;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{AgentController, AgentOutcome, ProgressNotification, TerminalReason, ToolCall};
pub use config::{AgentConfig, ConfigError};
pub use mcp::{CapabilityProvider, McpClient, ToolDescriptor};
pub use oracle::{ChatClient, DecisionOracle, OracleOutput};
