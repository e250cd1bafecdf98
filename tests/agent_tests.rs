//! Integration tests for the agent system
//!
//! These tests drive the agent controller end to end with scripted oracle
//! and provider doubles. Tests that need Ollama or a live MCP order service
//! are marked #[ignore].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;

use orderpilot::agent::call::Arguments;
use orderpilot::agent::{AgentController, ProgressKind, ProgressNotification, TerminalReason};
use orderpilot::config::AgentConfig;
use orderpilot::mcp::{CapabilityProvider, McpClient, ProviderError, ToolDescriptor};
use orderpilot::oracle::tool_use::{ChatMessage, ChatResponse, NativeToolCall, Tool, ToolFunction};
use orderpilot::oracle::{ChatClient, DecisionOracle, OracleError};
use orderpilot::parser::REPR_OUTPUT;

// ---------------------------------------------------------------------------
// Doubles
// ---------------------------------------------------------------------------

/// Replies from a script, then repeats `fallback` forever
struct ScriptedOracle {
    script: Mutex<VecDeque<Result<ChatMessage, String>>>,
    fallback: ChatMessage,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn new(script: Vec<Result<ChatMessage, String>>) -> Self {
        Self::repeating(script, ChatMessage::assistant("No tools called"))
    }

    fn repeating(script: Vec<Result<ChatMessage, String>>, fallback: ChatMessage) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: Vec<ChatMessage>, _tools: Vec<Tool>) -> Result<ChatResponse, OracleError> {
        if let Some(user) = messages.iter().rev().find(|m| m.role == "user") {
            self.prompts.lock().unwrap().push(user.content.clone());
        }
        let next = self.script.lock().unwrap().pop_front();
        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => return Err(OracleError::Stream(e)),
            None => self.fallback.clone(),
        };
        Ok(ChatResponse {
            message,
            done: true,
            eval_count: 0,
            eval_duration: 0,
        })
    }
}

/// Order service with `create_order` and `add_to_cart`
#[derive(Default)]
struct OrderService {
    invoked: Mutex<Vec<String>>,
}

impl OrderService {
    fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }
}

#[async_trait]
impl CapabilityProvider for OrderService {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ProviderError> {
        Ok(vec![
            ToolDescriptor {
                name: "create_order".to_string(),
                description: "Create an empty order".to_string(),
                parameter_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDescriptor {
                name: "add_to_cart".to_string(),
                description: "Add an item to an order".to_string(),
                parameter_schema: json!({
                    "type": "object",
                    "properties": {"order_id": {"type": "integer"}, "sku": {"type": "string"}}
                }),
            },
        ])
    }

    async fn invoke(&self, name: &str, _arguments: &Arguments) -> Result<String, ProviderError> {
        self.invoked.lock().unwrap().push(name.to_string());
        match name {
            "create_order" => Ok(r#"{"order_id":1}"#.to_string()),
            "add_to_cart" => Ok("added".to_string()),
            other => Err(ProviderError::UnknownTool(other.to_string())),
        }
    }
}

fn native(name: &str, arguments: serde_json::Value) -> ChatMessage {
    let mut message = ChatMessage::assistant("");
    message.tool_calls = Some(vec![NativeToolCall::new(name, arguments)]);
    message
}

fn controller(oracle: Arc<ScriptedOracle>, provider: Arc<OrderService>, config: AgentConfig) -> AgentController {
    AgentController::new(oracle, provider, config)
}

async fn collect(controller: &AgentController, question: &str) -> Vec<ProgressNotification> {
    controller.run(question).collect().await
}

// ---------------------------------------------------------------------------
// Configuration and wire types
// ---------------------------------------------------------------------------

/// Test that AgentConfig has sensible defaults
#[test]
fn test_agent_config_defaults() {
    let config = AgentConfig::default();

    assert_eq!(config.model, "qwen3");
    assert_eq!(config.max_iterations, 10);
    assert!(!config.stream);
    assert!(config.system_prompt.is_none());
    assert!(config.otlp_endpoint.is_none());
}

/// Test ChatMessage construction with helper methods
#[test]
fn test_chat_message_construction() {
    let user_msg = ChatMessage::user("Hello, world!");
    assert_eq!(user_msg.role, "user");
    assert_eq!(user_msg.content, "Hello, world!");
    assert!(user_msg.tool_calls.is_none());

    let system_msg = ChatMessage::system("You are helpful.");
    assert_eq!(system_msg.role, "system");

    let assistant_msg = ChatMessage::assistant("I can help!");
    assert_eq!(assistant_msg.role, "assistant");
}

/// Test that a provider descriptor becomes a declared tool
#[test]
fn test_tool_from_descriptor_serialization() {
    let descriptor = ToolDescriptor {
        name: "create_order".to_string(),
        description: "Create an empty order".to_string(),
        parameter_schema: json!({"type": "object", "properties": {}}),
    };
    let tool = Tool::from_descriptor(&descriptor);
    let ToolFunction {
        name,
        description,
        parameters,
    } = &tool.function;
    assert_eq!(tool.tool_type, "function");
    assert_eq!(name, "create_order");
    assert_eq!(description, "Create an empty order");
    assert_eq!(parameters, &json!({"type": "object", "properties": {}}));

    let json = serde_json::to_string(&tool).unwrap();
    assert!(json.contains("\"type\":\"function\""));
    assert!(json.contains("\"name\":\"create_order\""));
}

// ---------------------------------------------------------------------------
// Loop behavior
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_order_scenario() {
    let oracle = Arc::new(ScriptedOracle::new(vec![Ok(ChatMessage::assistant(
        r#"{"tool_calls":[{"function":{"name":"create_order","arguments":"{}"}}]}"#,
    ))]));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle, provider.clone(), AgentConfig::default());

    let outcome = controller.run_to_end("find a red mouse and create an order").await;

    assert_eq!(provider.invoked(), vec!["create_order"]);
    assert_eq!(outcome.history.len(), 1);
    assert_eq!(outcome.history[0].tool, "create_order");
    assert!(outcome.history[0].arguments.is_empty());
    assert!(!outcome.history[0].is_error);
    assert_eq!(outcome.history[0].result, r#"{"order_id":1}"#);
    assert_eq!(outcome.iterations, 2);
    assert!(!outcome.trace_id.is_empty());
}

#[tokio::test]
async fn test_no_tools_called_completes_in_one_iteration() {
    let oracle = Arc::new(ScriptedOracle::new(vec![]));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle, provider.clone(), AgentConfig::default());

    let notes = collect(&controller, "hello").await;
    let last = notes.last().unwrap();

    assert!(last.is_task_complete);
    assert!(!last.require_user_input);
    assert_eq!(last.content["message"], "Task completed");
    assert_eq!(last.content["iterations"], 1);
    assert!(matches!(last.terminal_reason, Some(TerminalReason::NoToolCalls { .. })));
    assert!(provider.invoked().is_empty());
}

#[tokio::test]
async fn test_summary_prose_completes_in_one_iteration() {
    let oracle = Arc::new(ScriptedOracle::repeating(
        vec![],
        ChatMessage::assistant("Your order (id=5) has been created."),
    ));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle, provider.clone(), AgentConfig::default());

    let outcome = controller.run_to_end("create an order").await;

    assert_eq!(outcome.iterations, 1);
    assert!(outcome.terminal_reason.finished_by_oracle());
    assert!(outcome.history.is_empty());
    assert!(provider.invoked().is_empty());
}

#[tokio::test]
async fn test_json_summary_completes_without_invoking() {
    let oracle = Arc::new(ScriptedOracle::repeating(
        vec![Ok(native("create_order", json!({})))],
        ChatMessage::assistant(r#"All done. Summary: {"order_id": 1, "customer": {"name": "Ann Lee"}}"#),
    ));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle, provider.clone(), AgentConfig::default());

    let outcome = controller.run_to_end("create an order for Ann Lee").await;

    assert_eq!(outcome.iterations, 2);
    assert!(matches!(outcome.terminal_reason, TerminalReason::NoToolCalls { .. }));
    assert_eq!(provider.invoked(), vec!["create_order"]);
}

#[tokio::test]
async fn test_empty_tool_calls_is_task_complete() {
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(native("create_order", json!({}))),
        Ok(ChatMessage::assistant(r#"{"tool_calls": []}"#)),
    ]));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle, provider.clone(), AgentConfig::default());

    let notes = collect(&controller, "create an order").await;
    let last = notes.last().unwrap();

    assert!(last.is_task_complete);
    assert_eq!(last.terminal_reason, Some(TerminalReason::TaskComplete));
    assert_eq!(last.content["iterations"], 2);
    assert_eq!(provider.invoked(), vec!["create_order"]);
}

#[tokio::test]
async fn test_budget_exhaustion_is_not_task_complete() {
    let oracle = Arc::new(ScriptedOracle::repeating(vec![], native("create_order", json!({}))));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle, provider.clone(), AgentConfig::default());

    let notes = collect(&controller, "keep ordering").await;

    let complete: Vec<&ProgressNotification> = notes.iter().filter(|n| n.is_task_complete).collect();
    assert_eq!(complete.len(), 1, "exactly one completion notification");
    assert_eq!(complete[0].terminal_reason, Some(TerminalReason::BudgetExhausted));
    assert_eq!(complete[0].content["iterations"], 10);
    assert!(notes.last().unwrap().is_task_complete);
    assert_eq!(provider.invoked().len(), 10);
}

#[tokio::test]
async fn test_custom_budget() {
    let oracle = Arc::new(ScriptedOracle::repeating(vec![], native("create_order", json!({}))));
    let provider = Arc::new(OrderService::default());
    let config = AgentConfig {
        max_iterations: 3,
        ..AgentConfig::default()
    };

    let outcome = controller(oracle, provider, config).run_to_end("keep ordering").await;

    assert_eq!(outcome.terminal_reason, TerminalReason::BudgetExhausted);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(outcome.history.len(), 3);
}

#[tokio::test]
async fn test_unknown_tool_is_recorded_and_loop_continues() {
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(native("refund_everything", json!({"all": true}))),
        Ok(native("create_order", json!({}))),
    ]));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle, provider, AgentConfig::default());

    let outcome = controller.run_to_end("refund and reorder").await;

    assert_eq!(outcome.history.len(), 2);
    assert_eq!(outcome.history[0].tool, "refund_everything");
    assert!(outcome.history[0].is_error);
    assert!(outcome.history[0].result.contains("refund_everything"));
    assert_eq!(outcome.history[0].arguments["all"], json!(true));
    assert!(!outcome.history[1].is_error);
    assert_eq!(outcome.iterations, 3);
}

#[tokio::test]
async fn test_repr_output_stops_without_invoking() {
    let oracle = Arc::new(ScriptedOracle::new(vec![Ok(ChatMessage::assistant(
        "[ChatCompletionMessageToolCall(id='call_1', function=Function(name='create_order', arguments='{}'), type='function')]",
    ))]));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle, provider.clone(), AgentConfig::default());

    let outcome = controller.run_to_end("create an order").await;

    assert_eq!(
        outcome.terminal_reason,
        TerminalReason::NoToolCalls {
            reason: REPR_OUTPUT.to_string()
        }
    );
    assert!(outcome.history.is_empty());
    assert!(provider.invoked().is_empty());
}

#[tokio::test]
async fn test_transport_failure_is_recorded_and_retried() {
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Err("connection refused".to_string()),
        Ok(native("create_order", json!({}))),
    ]));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle.clone(), provider, AgentConfig::default());

    let notes = collect(&controller, "create an order").await;
    let errors: Vec<&ProgressNotification> = notes.iter().filter(|n| n.kind == ProgressKind::Error).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].content["tool"], "oracle");
    assert_eq!(errors[0].content["isError"], true);

    let last = notes.last().unwrap();
    let history = last.content["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["tool"], "oracle");
    assert!(history[0]["result"].as_str().unwrap().contains("connection refused"));
    assert_eq!(history[1]["tool"], "create_order");
    assert_eq!(last.content["iterations"], 3);

    // The failure re-enters the next prompt
    assert!(oracle.prompts()[1].contains("connection refused"));
}

#[tokio::test]
async fn test_history_reenters_prompt_in_order() {
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(native("create_order", json!({}))),
        Ok(native("add_to_cart", json!({"order_id": 1, "sku": "MOUSE-RED"}))),
    ]));
    let provider = Arc::new(OrderService::default());
    let controller = controller(oracle.clone(), provider.clone(), AgentConfig::default());

    controller.run_to_end("find a red mouse and create an order").await;

    let prompts = oracle.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("Previously called tools"));
    let third = &prompts[2];
    let first = third.find("create_order\"").unwrap();
    let second = third.find("add_to_cart\"").unwrap();
    assert!(first < second);
    assert!(third.contains("\"isError\":false") || third.contains("\"isError\": false"));
    assert_eq!(provider.invoked(), vec!["create_order", "add_to_cart"]);
}

#[tokio::test]
async fn test_notification_sequence() {
    let oracle = Arc::new(ScriptedOracle::new(vec![
        Ok(native("create_order", json!({}))),
        Ok(ChatMessage::assistant("")),
    ]));
    let controller = controller(oracle, Arc::new(OrderService::default()), AgentConfig::default());

    let notes = collect(&controller, "create an order").await;
    let kinds: Vec<ProgressKind> = notes.iter().map(|n| n.kind).collect();

    assert_eq!(
        kinds,
        vec![
            ProgressKind::Step,
            ProgressKind::ToolCalls,
            ProgressKind::ToolResults,
            ProgressKind::Step,
            ProgressKind::Complete,
        ]
    );
    assert_eq!(notes[0].content, json!("Step 0"));
    assert_eq!(notes[3].content, json!("Step 1"));
    assert_eq!(notes[1].content[0]["name"], "create_order");
    assert_eq!(notes[2].content[0]["tool"], "create_order");
}

#[tokio::test]
async fn test_streaming_forwards_decision_chunks() {
    let oracle = Arc::new(ScriptedOracle::new(vec![Ok(ChatMessage::assistant(
        r#"I'll create the order. {"name": "create_order", "arguments": {}}"#,
    ))]));
    let provider = Arc::new(OrderService::default());
    let config = AgentConfig {
        stream: true,
        ..AgentConfig::default()
    };
    let controller = controller(oracle, provider.clone(), config);

    let notes = collect(&controller, "create an order").await;

    let chunks: Vec<String> = notes
        .iter()
        .filter(|n| n.kind == ProgressKind::DecisionChunk)
        .map(|n| n.content_text())
        .collect();
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].contains("create_order"));
    assert_eq!(chunks[1], "No tools called");
    assert_eq!(provider.invoked(), vec!["create_order"]);
    assert!(notes.last().unwrap().is_task_complete);
}

#[tokio::test]
async fn test_concurrent_questions_keep_separate_history() {
    let oracle = Arc::new(ScriptedOracle::repeating(vec![], native("create_order", json!({}))));
    let provider = Arc::new(OrderService::default());
    let config = AgentConfig {
        max_iterations: 2,
        ..AgentConfig::default()
    };
    let controller = controller(oracle, provider, config);

    let (a, b) = tokio::join!(controller.run_to_end("first"), controller.run_to_end("second"));

    assert_eq!(a.history.len(), 2);
    assert_eq!(b.history.len(), 2);
    assert_ne!(a.trace_id, b.trace_id);
}

// ---------------------------------------------------------------------------
// Live services
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore = "Requires Ollama and an MCP order service running"]
async fn test_live_create_order() {
    let config = AgentConfig::from_env().unwrap();
    let oracle = Arc::new(ChatClient::new(config.oracle_url.clone(), config.model.clone()));
    let provider = Arc::new(McpClient::new(config.mcp_url.clone()));
    let controller = AgentController::new(oracle, provider, config);

    let outcome = controller
        .run_to_end("Please create an order for one red wireless mouse.")
        .await;

    assert!(outcome.iterations >= 1);
    assert!(outcome.history.iter().any(|e| e.tool == "create_order"));
}
