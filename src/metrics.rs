//! Prometheus metrics for the agent loop
//!
//! Metrics live in the default registry; [`gather_text`] renders them in
//! the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder,
    Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Finished loops, by terminal outcome.
    ///
    /// Labels:
    /// - outcome: "task_complete", "no_tool_calls" or "budget_exhausted"
    pub static ref AGENT_TASKS: CounterVec = register_counter_vec!(
        "orderpilot_agent_tasks_total",
        "Agent loops finished, by terminal outcome",
        &["outcome"]
    ).expect("failed to register AGENT_TASKS metric");

    /// Decisions made per loop.
    pub static ref AGENT_ITERATIONS: Histogram = register_histogram!(
        "orderpilot_agent_iterations",
        "Decision iterations per agent loop",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 15.0, 20.0]
    ).expect("failed to register AGENT_ITERATIONS metric");

    /// Tool invocations.
    ///
    /// Labels:
    /// - tool: tool name as called by the oracle
    /// - status: "ok" or "error"
    pub static ref AGENT_TOOL_CALLS: CounterVec = register_counter_vec!(
        "orderpilot_tool_calls_total",
        "Tool invocations, by tool and status",
        &["tool", "status"]
    ).expect("failed to register AGENT_TOOL_CALLS metric");

    /// Wall-clock time of oracle calls, streamed ones included.
    pub static ref ORACLE_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "orderpilot_oracle_call_duration_seconds",
        "Duration of decision oracle calls",
        &["model"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).expect("failed to register ORACLE_CALL_DURATION metric");

    /// Parser results.
    ///
    /// Labels:
    /// - shape: output shape ("native", "mapping", "text", "stream", "failure")
    /// - result: "calls", "no_tool_calls", "repr" or "upstream"
    pub static ref PARSE_OUTCOMES: CounterVec = register_counter_vec!(
        "orderpilot_parse_outcomes_total",
        "Tool-call parser results, by oracle output shape",
        &["shape", "result"]
    ).expect("failed to register PARSE_OUTCOMES metric");
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
