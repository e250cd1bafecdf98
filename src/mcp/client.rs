//! MCP client over HTTP JSON-RPC
//!
//! Speaks the subset of the Model Context Protocol the agent needs:
//! `initialize`, `tools/list` and `tools/call`. Servers may answer either
//! with a plain JSON body or with a `text/event-stream` body carrying the
//! JSON-RPC response in a `data:` line; both are accepted.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{CapabilityProvider, ProviderError, ToolDescriptor};
use crate::agent::call::Arguments;

const PROTOCOL_VERSION: &str = "2025-03-26";
const SESSION_HEADER: &str = "mcp-session-id";

/// JSON-RPC client for an MCP server
pub struct McpClient {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    /// Session id handed out by the server during `initialize`, if any
    session: OnceCell<Option<String>>,
}

impl McpClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `endpoint` - Full URL of the MCP endpoint (e.g., "http://localhost:8050/mcp")
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
            session: OnceCell::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run the initialize handshake once and return the session id
    async fn session(&self) -> Result<Option<&str>, ProviderError> {
        let session = self
            .session
            .get_or_try_init(|| async {
                let request = json!({
                    "jsonrpc": "2.0",
                    "id": self.next_id.fetch_add(1, Ordering::Relaxed),
                    "method": "initialize",
                    "params": {
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": {},
                        "clientInfo": {
                            "name": "orderpilot",
                            "version": env!("CARGO_PKG_VERSION"),
                        }
                    }
                });
                let (session, body) = self.post(request, None).await?;
                let body = body.ok_or_else(|| {
                    ProviderError::Protocol("empty initialize response".to_string())
                })?;
                let result = rpc_result(body)?;
                info!(
                    endpoint = %self.endpoint,
                    server = %result["serverInfo"]["name"].as_str().unwrap_or("unknown"),
                    "MCP session initialized"
                );

                let notification = json!({
                    "jsonrpc": "2.0",
                    "method": "notifications/initialized",
                });
                self.post(notification, session.as_deref()).await?;
                Ok::<_, ProviderError>(session)
            })
            .await?;
        Ok(session.as_deref())
    }

    /// Send a request and return its `result`
    async fn call(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let session = self.session().await?;
        let request = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        debug!(method, "MCP request");
        let (_, body) = self.post(request, session).await?;
        let body = body.ok_or_else(|| {
            ProviderError::Protocol(format!("empty response to {}", method))
        })?;
        rpc_result(body)
    }

    /// POST one JSON-RPC message; returns the session header and decoded body
    async fn post(
        &self,
        message: Value,
        session: Option<&str>,
    ) -> Result<(Option<String>, Option<Value>), ProviderError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json, text/event-stream")
            .json(&message);
        if let Some(id) = session {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request.send().await?.error_for_status()?;
        let session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);
        let text = response.text().await?;

        let payload = if is_event_stream {
            last_sse_data(&text)
        } else {
            Some(text.as_str())
        };
        let body = match payload.map(str::trim) {
            Some(p) if !p.is_empty() => Some(
                serde_json::from_str(p)
                    .map_err(|e| ProviderError::Protocol(format!("invalid JSON-RPC body: {}", e)))?,
            ),
            _ => None,
        };
        Ok((session, body))
    }
}

#[async_trait]
impl CapabilityProvider for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let result = self.call("tools/list", params).await?;
            let page: Vec<ToolDescriptor> = serde_json::from_value(result["tools"].clone())
                .map_err(|e| ProviderError::Protocol(format!("invalid tools/list result: {}", e)))?;
            tools.extend(page);

            cursor = result["nextCursor"].as_str().map(|s| s.to_string());
            if cursor.is_none() {
                break;
            }
        }
        Ok(tools)
    }

    async fn invoke(&self, name: &str, arguments: &Arguments) -> Result<String, ProviderError> {
        let result = self
            .call("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
            .map_err(|e| match e {
                ProviderError::Protocol(msg) if msg.to_lowercase().contains("unknown tool") => {
                    ProviderError::UnknownTool(name.to_string())
                }
                other => other,
            })?;

        let text = call_text(&result);
        if result["isError"].as_bool() == Some(true) {
            if text.to_lowercase().contains("unknown tool") {
                return Err(ProviderError::UnknownTool(name.to_string()));
            }
            return Err(ProviderError::ToolReported(text));
        }
        Ok(text)
    }
}

/// Extract `result` from a JSON-RPC response, turning `error` into a ProviderError
fn rpc_result(mut body: Value) -> Result<Value, ProviderError> {
    if let Some(error) = body.get("error") {
        let code = error["code"].as_i64().unwrap_or(0);
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(ProviderError::Protocol(format!("{} ({})", message, code)));
    }
    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(ProviderError::Protocol(
            "response has neither result nor error".to_string(),
        )),
    }
}

/// Text payload of a `tools/call` result
///
/// Text content items are joined with newlines. Without text items the
/// structured content (if any) is returned serialized.
fn call_text(result: &Value) -> String {
    let texts: Vec<&str> = result["content"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|item| item["type"].as_str().unwrap_or("text") == "text")
                .filter_map(|item| item["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if !texts.is_empty() {
        return texts.join("\n");
    }
    match result.get("structuredContent") {
        Some(v) if !v.is_null() => v.to_string(),
        _ => String::new(),
    }
}

/// Last `data:` payload of an event-stream body
fn last_sse_data(body: &str) -> Option<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .last()
}
