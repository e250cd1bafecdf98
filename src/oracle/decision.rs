//! Decision step: one prompt to the oracle, one raw output back
//!
//! The step never fails. Transport errors, timeouts and malformed streams
//! come back as [`OracleOutput::Failure`] so the loop can record them and
//! move on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

use super::client::{ChunkStream, StreamChunk};
use super::output::OracleOutput;
use super::tool_use::{build_decision_prompt, ChatMessage, ChatResponse, Tool, DEFAULT_AGENT_SYSTEM_PROMPT};
use crate::agent::history::History;
use crate::mcp::ToolDescriptor;
use crate::metrics::ORACLE_CALL_DURATION;

/// Error type for oracle calls
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Empty response from oracle")]
    EmptyResponse,
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),
}

/// A chat endpoint that can pick tools
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Model identifier, for logs and metrics
    fn model(&self) -> &str;

    /// Single-shot completion
    async fn chat(&self, messages: Vec<ChatMessage>, tools: Vec<Tool>) -> Result<ChatResponse, OracleError>;

    /// Streamed completion
    ///
    /// The default implementation replays a single-shot completion as a
    /// short stream, for oracles without a streaming endpoint.
    async fn chat_stream(&self, messages: Vec<ChatMessage>, tools: Vec<Tool>) -> Result<ChunkStream, OracleError> {
        let response = self.chat(messages, tools).await?;
        let mut chunks = Vec::new();
        if !response.message.content.is_empty() {
            chunks.push(StreamChunk::Token(response.message.content));
        }
        if let Some(calls) = response.message.tool_calls.filter(|c| !c.is_empty()) {
            chunks.push(StreamChunk::ToolCalls(calls));
        }
        chunks.push(StreamChunk::Done {
            eval_count: response.eval_count,
            eval_duration_ns: response.eval_duration,
        });
        Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))))
    }
}

/// Item of a streamed decision
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionEvent {
    /// Text as it arrives
    Fragment(String),
    /// The complete output; always the last item
    Output(OracleOutput),
}

/// Issues decision prompts to an oracle
pub struct DecisionStep {
    oracle: Arc<dyn DecisionOracle>,
    system_prompt: String,
    timeout: Option<Duration>,
}

impl DecisionStep {
    pub fn new(oracle: Arc<dyn DecisionOracle>) -> Self {
        Self {
            oracle,
            system_prompt: DEFAULT_AGENT_SYSTEM_PROMPT.to_string(),
            timeout: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        if let Some(prompt) = system_prompt {
            self.system_prompt = prompt;
        }
        self
    }

    /// Bound the oracle call; for streams the bound applies to each wait
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        self.oracle.model()
    }

    /// Messages sent for one decision
    pub fn messages(&self, question: &str, tools: &[ToolDescriptor], history: &History) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(build_decision_prompt(
                question,
                tools,
                &history.render_prompt_section(),
            )),
        ]
    }

    /// Ask the oracle once and return its whole answer
    pub async fn decide(&self, question: &str, tools: &[ToolDescriptor], history: &History) -> OracleOutput {
        let messages = self.messages(question, tools, history);
        let declared: Vec<Tool> = tools.iter().map(Tool::from_descriptor).collect();
        let start = Instant::now();

        let call = self.oracle.chat(messages, declared);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(OracleError::Timeout(limit))),
            None => call.await,
        };
        self.observe(start);

        match result {
            Ok(response) => {
                debug!(
                    eval_count = response.eval_count,
                    has_tool_calls = response.message.tool_calls.is_some(),
                    "Oracle replied"
                );
                OracleOutput::from_message(response.message)
            }
            Err(e) => {
                warn!(error = %e, "Oracle call failed");
                OracleOutput::Failure(e.to_string())
            }
        }
    }

    /// Ask the oracle and stream its answer
    ///
    /// Yields text fragments as they arrive, then exactly one
    /// [`DecisionEvent::Output`]: native calls if the model emitted any,
    /// otherwise the collected fragments, or a failure if the stream broke.
    pub fn decide_streaming<'a>(
        &'a self,
        question: &'a str,
        tools: &'a [ToolDescriptor],
        history: &'a History,
    ) -> impl Stream<Item = DecisionEvent> + Send + 'a {
        async_stream::stream! {
            let messages = self.messages(question, tools, history);
            let declared: Vec<Tool> = tools.iter().map(Tool::from_descriptor).collect();
            let start = Instant::now();

            let opened = self.oracle.chat_stream(messages, declared);
            let opened = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, opened)
                    .await
                    .unwrap_or(Err(OracleError::Timeout(limit))),
                None => opened.await,
            };
            let mut chunks = match opened {
                Ok(chunks) => chunks,
                Err(e) => {
                    self.observe(start);
                    warn!(error = %e, "Oracle stream failed to open");
                    yield DecisionEvent::Output(OracleOutput::Failure(e.to_string()));
                    return;
                }
            };

            let mut fragments = Vec::new();
            let mut native_calls = Vec::new();
            loop {
                let next = match self.timeout {
                    Some(limit) => match tokio::time::timeout(limit, chunks.next()).await {
                        Ok(next) => next,
                        Err(_) => Some(Err(OracleError::Timeout(limit))),
                    },
                    None => chunks.next().await,
                };
                match next {
                    Some(Ok(StreamChunk::Token(text))) => {
                        fragments.push(text.clone());
                        yield DecisionEvent::Fragment(text);
                    }
                    Some(Ok(StreamChunk::ToolCalls(calls))) => native_calls.extend(calls),
                    Some(Ok(StreamChunk::Done { eval_count, .. })) => {
                        debug!(eval_count, fragments = fragments.len(), "Oracle stream done");
                        break;
                    }
                    Some(Err(e)) => {
                        self.observe(start);
                        warn!(error = %e, "Oracle stream broke");
                        yield DecisionEvent::Output(OracleOutput::Failure(e.to_string()));
                        return;
                    }
                    None => break,
                }
            }
            self.observe(start);

            if native_calls.is_empty() {
                yield DecisionEvent::Output(OracleOutput::Fragments(fragments));
            } else {
                yield DecisionEvent::Output(OracleOutput::NativeCalls(native_calls));
            }
        }
    }

    fn observe(&self, start: Instant) {
        ORACLE_CALL_DURATION
            .with_label_values(&[self.oracle.model()])
            .observe(start.elapsed().as_secs_f64());
    }
}
