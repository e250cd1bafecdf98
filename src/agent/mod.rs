//! Agent module for LLM-driven order processing
//!
//! This module provides the agent loop that orchestrates:
//! - a decision oracle (Ollama /api/chat with tools)
//! - the tool-call parser
//! - an MCP capability provider
//!
//! # Architecture
//!
//! ```text
//! Question → AgentController ── Step i ──► DecisionStep → oracle
//!                  ↑                              ↓
//!                  │                        OracleOutput
//!                  │                              ↓
//!                  │                       parser::parse ── no calls ──► Complete
//!                  │                              ↓
//!                  │                     CapabilityInvoker → provider
//!                  │                              ↓
//!                  └──────── History ◄──── ToolResults
//!                                                 (budget spent ──► Complete)
//! ```

pub mod call;
pub mod controller;
pub mod history;
pub mod inbox;
pub mod invoker;
pub mod progress;

pub use call::{Arguments, ToolCall, ToolOutcome, ToolResult};
pub use controller::{AgentController, AgentOutcome};
pub use history::{History, HistoryEntry};
pub use inbox::{InboxError, InboxLedger};
pub use invoker::CapabilityInvoker;
pub use progress::{ProgressKind, ProgressNotification, TerminalReason};
