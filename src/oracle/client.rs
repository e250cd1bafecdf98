//! Ollama chat client used as the decision oracle

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use serde_json::Value;

use super::decision::{DecisionOracle, OracleError};
use super::tool_use::{ChatMessage, ChatResponse, NativeToolCall, Tool};

/// Represents a single item from a streamed chat response.
///
/// Ollama streams one JSON object per line. Content arrives as token
/// fragments; native tool calls arrive whole, usually in a single line
/// just before the final `done` line.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// A text fragment of the assistant message
    Token(String),
    /// Native tool calls emitted by the model
    ToolCalls(Vec<NativeToolCall>),
    /// The final line containing token/timing metadata
    Done { eval_count: u32, eval_duration_ns: u64 },
}

/// Boxed stream of chunks, as returned by [`DecisionOracle::chat_stream`]
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, OracleError>> + Send>>;

/// Client for Ollama's /api/chat endpoint with tool support
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl ChatClient {
    /// Create a new chat client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the Ollama server (e.g., "http://localhost:11434")
    /// * `model` - The model name (e.g., "qwen3")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            timeout: Some(Duration::from_secs(120)),
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Upper bound for a whole request, body included; `None` removes it
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, messages: &[ChatMessage], tools: &[Tool], stream: bool) -> Result<reqwest::RequestBuilder, OracleError> {
        let endpoint = format!("{}/api/chat", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "options": {
                "temperature": 0.0
            }
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
        }

        let mut request = self.client.post(&endpoint).json(&body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        Ok(request)
    }
}

#[async_trait]
impl DecisionOracle for ChatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: Vec<ChatMessage>, tools: Vec<Tool>) -> Result<ChatResponse, OracleError> {
        let response = self
            .request(&messages, &tools, false)?
            .send()
            .await?
            .error_for_status()?;

        let text = response.text().await?;

        if text.is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)?;
        Ok(chat_response)
    }

    async fn chat_stream(&self, messages: Vec<ChatMessage>, tools: Vec<Tool>) -> Result<ChunkStream, OracleError> {
        let response = self
            .request(&messages, &tools, true)?
            .send()
            .await?
            .error_for_status()?;
        let mut bytes_stream = Box::pin(response.bytes_stream());

        let chunks = async_stream::stream! {
            let mut lines = LineBuffer::new();
            while let Some(next) = bytes_stream.next().await {
                let decoded = match next {
                    Ok(bytes) => lines.feed(&bytes),
                    Err(e) => Err(OracleError::Request(e)),
                };
                match decoded {
                    Ok(parsed) => {
                        for chunk in parsed {
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
            match lines.finish() {
                Ok(parsed) => {
                    for chunk in parsed {
                        yield Ok(chunk);
                    }
                }
                Err(e) => yield Err(e),
            }
        };

        Ok(Box::pin(chunks))
    }
}

/// Reassembles NDJSON lines from network chunks
///
/// Chunks do not line up with lines: one line may span several chunks and
/// one chunk may carry several lines. Only complete lines are decoded.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and decode every line they complete
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<StreamChunk>, OracleError> {
        self.pending.extend_from_slice(bytes);
        let mut chunks = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            chunks.extend(parse_stream_line(&line)?);
        }
        Ok(chunks)
    }

    /// Decode the last line of a body that did not end with a newline
    pub fn finish(&mut self) -> Result<Vec<StreamChunk>, OracleError> {
        let rest = std::mem::take(&mut self.pending);
        parse_stream_line(&rest)
    }
}

/// Decode one NDJSON line of a streamed /api/chat response
///
/// Blank lines yield nothing. A line with an `error` field is a stream error.
pub fn parse_stream_line(line: &[u8]) -> Result<Vec<StreamChunk>, OracleError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let data: Value = serde_json::from_str(text)?;
    if let Some(error) = data.get("error") {
        let message = error.as_str().map(|s| s.to_string()).unwrap_or_else(|| error.to_string());
        return Err(OracleError::Stream(message));
    }

    let mut chunks = Vec::new();
    if let Some(token) = data["message"]["content"].as_str() {
        if !token.is_empty() {
            chunks.push(StreamChunk::Token(token.to_string()));
        }
    }
    if let Some(calls) = data["message"].get("tool_calls") {
        let calls: Vec<NativeToolCall> = serde_json::from_value(calls.clone()).unwrap_or_default();
        if !calls.is_empty() {
            chunks.push(StreamChunk::ToolCalls(calls));
        }
    }
    if data["done"].as_bool() == Some(true) {
        chunks.push(StreamChunk::Done {
            eval_count: data["eval_count"].as_u64().unwrap_or(0) as u32,
            eval_duration_ns: data["eval_duration"].as_u64().unwrap_or(0),
        });
    }
    Ok(chunks)
}
