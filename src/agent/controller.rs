//! Agent Controller - the bounded decide / parse / invoke / record loop
//!
//! One [`AgentController::run`] call owns one question: its history, its
//! iteration counter and its terminal state. Nothing is shared between
//! concurrent runs except the read-mostly oracle and provider handles.

use std::sync::Arc;

use futures_util::{pin_mut, Stream, StreamExt};
use serde_json::json;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::call::ToolCall;
use super::history::{History, HistoryEntry};
use super::invoker::CapabilityInvoker;
use super::progress::{ProgressKind, ProgressNotification, TerminalReason};
use crate::config::AgentConfig;
use crate::mcp::{CapabilityProvider, ToolDescriptor};
use crate::metrics::{AGENT_ITERATIONS, AGENT_TASKS, PARSE_OUTCOMES};
use crate::oracle::{DecisionEvent, DecisionOracle, DecisionStep, OracleOutput};
use crate::parser::{self, ParseFailure};

/// Result of a loop drained to its end
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Why the loop stopped
    pub terminal_reason: TerminalReason,
    /// Number of decisions made
    pub iterations: usize,
    /// Every recorded call, oldest first
    pub history: Vec<HistoryEntry>,
    /// Unique trace ID for this agent run
    pub trace_id: String,
}

/// Drives one question to a terminal state
pub struct AgentController {
    decision: DecisionStep,
    invoker: CapabilityInvoker,
    provider: Arc<dyn CapabilityProvider>,
    config: AgentConfig,
}

impl AgentController {
    /// Create a new agent controller
    ///
    /// # Arguments
    /// * `oracle` - Chat endpoint that decides which tools to call
    /// * `provider` - Tool catalogue and invocation backend
    /// * `config` - Agent configuration
    pub fn new(
        oracle: Arc<dyn DecisionOracle>,
        provider: Arc<dyn CapabilityProvider>,
        config: AgentConfig,
    ) -> Self {
        let decision = DecisionStep::new(oracle)
            .with_system_prompt(config.system_prompt.clone())
            .with_timeout(config.oracle_timeout);
        let invoker = CapabilityInvoker::new(provider.clone()).with_timeout(config.tool_timeout);
        Self {
            decision,
            invoker,
            provider,
            config,
        }
    }

    /// Configuration the loop runs with
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run the loop for a question, yielding progress as it happens
    ///
    /// The stream is finite and ends with exactly one notification whose
    /// `is_task_complete` is true. Dropping it cancels the run.
    pub fn run<'a>(&'a self, question: &'a str) -> impl Stream<Item = ProgressNotification> + Send + 'a {
        self.run_traced(question, Uuid::now_v7().to_string())
    }

    /// Run the loop and keep only its outcome
    pub async fn run_to_end(&self, question: &str) -> AgentOutcome {
        let trace_id = Uuid::now_v7().to_string();
        let notifications = self.run_traced(question, trace_id.clone());
        pin_mut!(notifications);

        let mut last = None;
        while let Some(note) = notifications.next().await {
            last = Some(note);
        }
        outcome_from(last, trace_id)
    }

    fn run_traced<'a>(
        &'a self,
        question: &'a str,
        trace_id: String,
    ) -> impl Stream<Item = ProgressNotification> + Send + 'a {
        async_stream::stream! {
            let task_span = info_span!(
                "agent_task",
                trace_id = %trace_id,
                model = %self.decision.model(),
                otel.name = "agent_task"
            );
            task_span.in_scope(|| info!(trace_id = %trace_id, question = %question, "Starting agent task"));

            let max_iterations = self.config.max_iterations.max(1);
            let mut history = History::new();
            let mut iteration = 0usize;

            let reason = loop {
                yield ProgressNotification::progress(ProgressKind::Step, format!("Step {}", iteration));

                let tools = self.tools().instrument(task_span.clone()).await;
                let oracle_span = info_span!(
                    parent: &task_span,
                    "oracle_call",
                    iteration,
                    tools = tools.len(),
                    otel.name = "oracle_call"
                );

                // Deciding
                let mut streamed = String::new();
                let output = if self.config.stream {
                    let events = self.decision.decide_streaming(question, &tools, &history);
                    pin_mut!(events);
                    let mut output = None;
                    while let Some(event) = events.next().instrument(oracle_span.clone()).await {
                        match event {
                            DecisionEvent::Fragment(text) => {
                                streamed.push_str(&text);
                                yield ProgressNotification::progress(ProgressKind::DecisionChunk, text);
                            }
                            DecisionEvent::Output(out) => output = Some(out),
                        }
                    }
                    output.unwrap_or_else(|| OracleOutput::Failure("Oracle stream ended without output".to_string()))
                } else {
                    let output = self
                        .decision
                        .decide(question, &tools, &history)
                        .instrument(oracle_span.clone())
                        .await;
                    match &output {
                        OracleOutput::Text(text) if !text.is_empty() => {
                            yield ProgressNotification::progress(ProgressKind::DecisionChunk, text.clone());
                        }
                        OracleOutput::Mapping(map) => {
                            yield ProgressNotification::progress(ProgressKind::DecisionChunk, json!(map));
                        }
                        _ => {}
                    }
                    output
                };
                iteration += 1;

                // Parsing
                let parsed = parser::parse(&output, (!streamed.is_empty()).then_some(streamed.as_str()));
                PARSE_OUTCOMES
                    .with_label_values(&[output.shape(), parse_label(&parsed)])
                    .inc();

                let calls = match parsed {
                    Ok(calls) if calls.is_empty() => break TerminalReason::TaskComplete,
                    Ok(calls) => calls,
                    Err(ParseFailure::Upstream(message)) => {
                        oracle_span.in_scope(|| warn!(iteration, error = %message, "Recording oracle failure"));
                        let entry = history.append_oracle_failure(message).clone();
                        yield ProgressNotification::progress(ProgressKind::Error, json!(entry));
                        if iteration >= max_iterations {
                            break TerminalReason::BudgetExhausted;
                        }
                        continue;
                    }
                    Err(failure) => {
                        oracle_span.in_scope(|| debug!(iteration, reason = %failure, "No tool calls parsed"));
                        break TerminalReason::NoToolCalls { reason: failure.reason() };
                    }
                };

                // Invoking
                yield ProgressNotification::progress(ProgressKind::ToolCalls, json!(calls));
                let results = self.invoker.invoke_all(&calls).instrument(task_span.clone()).await;

                // Recording
                for (call, result) in calls.iter().zip(results.iter()) {
                    let entry = history.append(call, result);
                    task_span.in_scope(|| {
                        debug!(iteration, tool = %entry.tool, is_error = entry.is_error, "Recorded tool result")
                    });
                }
                yield ProgressNotification::progress(ProgressKind::ToolResults, history.render());

                if iteration >= max_iterations {
                    break TerminalReason::BudgetExhausted;
                }
            };

            task_span.in_scope(|| {
                if reason.finished_by_oracle() {
                    info!(trace_id = %trace_id, iterations = iteration, calls = history.len(), reason = reason.label(), "Agent task completed");
                } else {
                    warn!(trace_id = %trace_id, iterations = iteration, calls = history.len(), "Iteration budget exhausted");
                }
            });
            AGENT_TASKS.with_label_values(&[reason.label()]).inc();
            AGENT_ITERATIONS.observe(iteration as f64);

            yield ProgressNotification::complete(reason, iteration, history.entries());
        }
    }

    /// Current catalogue; a provider failure leaves the oracle with no tools
    async fn tools(&self) -> Vec<ToolDescriptor> {
        match self.provider.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(error = %e, "Failed to list tools");
                Vec::new()
            }
        }
    }
}

fn parse_label(parsed: &Result<Vec<ToolCall>, ParseFailure>) -> &'static str {
    match parsed {
        Ok(calls) if calls.is_empty() => "complete",
        Ok(_) => "calls",
        Err(ParseFailure::NoToolCalls) => "no_tool_calls",
        Err(ParseFailure::ReprOutput) => "repr",
        Err(ParseFailure::Upstream(_)) => "upstream",
    }
}

/// Rebuild the outcome from the terminal notification
fn outcome_from(last: Option<ProgressNotification>, trace_id: String) -> AgentOutcome {
    let Some(note) = last else {
        return AgentOutcome {
            terminal_reason: TerminalReason::TaskComplete,
            iterations: 0,
            history: Vec::new(),
            trace_id,
        };
    };

    let iterations = note.content["iterations"].as_u64().unwrap_or(0) as usize;
    let history = serde_json::from_value(note.content["history"].clone()).unwrap_or_default();
    AgentOutcome {
        terminal_reason: note.terminal_reason.unwrap_or(TerminalReason::TaskComplete),
        iterations,
        history,
        trace_id,
    }
}
