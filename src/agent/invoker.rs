//! Capability invoker: runs a batch of tool calls against the provider
//!
//! Calls run one after another in input order, since later calls may depend
//! on earlier ones (an order must exist before items are added to it).
//! Every call yields exactly one result; provider errors, timeouts and
//! nameless calls become `Err` results instead of aborting the batch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, info_span, warn, Instrument};

use super::call::{ToolCall, ToolResult};
use crate::mcp::{CapabilityProvider, ProviderError};
use crate::metrics::AGENT_TOOL_CALLS;

/// Stateless pass-through from canonical calls to the provider
#[derive(Clone)]
pub struct CapabilityInvoker {
    provider: Arc<dyn CapabilityProvider>,
    timeout: Option<Duration>,
}

impl CapabilityInvoker {
    pub fn new(provider: Arc<dyn CapabilityProvider>) -> Self {
        Self {
            provider,
            timeout: None,
        }
    }

    /// Bound each individual invocation
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invoke every call in order; the output mirrors the input one-to-one
    pub async fn invoke_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.invoke(call).await);
        }
        results
    }

    /// Invoke a single call, normalizing every failure into an `Err` result
    pub async fn invoke(&self, call: &ToolCall) -> ToolResult {
        if call.name.trim().is_empty() {
            warn!("Rejecting tool call without a name");
            AGENT_TOOL_CALLS.with_label_values(&["", "error"]).inc();
            return ToolResult::err(call, "Tool call is missing a name");
        }

        let span = info_span!("tool_call", tool = %call.name, otel.name = "tool_call");
        let outcome = async {
            let invocation = self.provider.invoke(&call.name, &call.arguments);
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, invocation)
                    .await
                    .unwrap_or_else(|_| {
                        Err(ProviderError::Timeout {
                            tool: call.name.clone(),
                            after: limit,
                        })
                    }),
                None => invocation.await,
            }
        }
        .instrument(span)
        .await;

        match outcome {
            Ok(payload) => {
                info!(tool = %call.name, bytes = payload.len(), "Tool call succeeded");
                AGENT_TOOL_CALLS.with_label_values(&[&call.name, "ok"]).inc();
                ToolResult::ok(call, payload)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                AGENT_TOOL_CALLS.with_label_values(&[&call.name, "error"]).inc();
                ToolResult::err(call, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::call::{Arguments, ToolOutcome};
    use crate::mcp::ToolDescriptor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records invocation order; `fail_*` tools error, `slow` never returns in time
    #[derive(Default)]
    struct RecordingProvider {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CapabilityProvider for RecordingProvider {
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError> {
            Ok(vec![])
        }

        async fn invoke(&self, name: &str, _arguments: &Arguments) -> Result<String, ProviderError> {
            self.seen.lock().unwrap().push(name.to_string());
            if name == "slow" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if name.starts_with("fail_") {
                return Err(ProviderError::UnknownTool(name.to_string()));
            }
            Ok(format!("{} done", name))
        }
    }

    #[tokio::test]
    async fn test_results_mirror_calls_in_order() {
        let provider = Arc::new(RecordingProvider::default());
        let invoker = CapabilityInvoker::new(provider.clone());
        let calls = vec![
            ToolCall::bare("create_order"),
            ToolCall::bare("fail_lookup"),
            ToolCall::bare(""),
            ToolCall::bare("add_to_cart"),
        ];

        let results = invoker.invoke_all(&calls).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].outcome, ToolOutcome::Ok("create_order done".into()));
        assert_eq!(results[1].outcome, ToolOutcome::Err("Unknown tool: fail_lookup".into()));
        assert_eq!(results[2].outcome, ToolOutcome::Err("Tool call is missing a name".into()));
        assert_eq!(results[3].name, "add_to_cart");
        // The nameless call never reaches the provider
        assert_eq!(
            *provider.seen.lock().unwrap(),
            vec!["create_order", "fail_lookup", "add_to_cart"]
        );
    }

    #[tokio::test]
    async fn test_timeout_becomes_error() {
        let invoker = CapabilityInvoker::new(Arc::new(RecordingProvider::default()))
            .with_timeout(Some(Duration::from_millis(50)));
        let result = invoker.invoke(&ToolCall::bare("slow")).await;
        assert!(result.is_err());
        assert!(result.outcome.text().contains("timed out"));
    }
}
