//! orderpilot CLI
//!
//! ```text
//! orderpilot ask "find a red mouse and create an order"
//! orderpilot inbox --dir ./emails --all
//! orderpilot tools
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::{pin_mut, StreamExt};
use tracing::{info, warn};

use orderpilot::agent::inbox::{email_name, STATUS_COMPLETED};
use orderpilot::agent::{InboxLedger, ProgressKind, ProgressNotification, TerminalReason};
use orderpilot::{AgentConfig, AgentController, CapabilityProvider, ChatClient, McpClient};

/// CLI arguments for orderpilot
#[derive(Parser, Debug)]
#[command(name = "orderpilot")]
#[command(author, version, about = "LLM agent that turns order requests into tool calls")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Oracle model (overrides ORDERPILOT_MODEL)
    #[arg(long, global = true, value_name = "MODEL")]
    model: Option<String>,

    /// Decision budget per question (overrides ORDERPILOT_MAX_ITERATIONS)
    #[arg(long, global = true, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    max_iterations: Option<u32>,

    /// Ollama-compatible base URL (overrides ORDERPILOT_ORACLE_URL)
    #[arg(long, global = true, value_name = "URL")]
    oracle_url: Option<String>,

    /// MCP endpoint of the order service (overrides ORDERPILOT_MCP_URL)
    #[arg(long, global = true, value_name = "URL")]
    mcp_url: Option<String>,

    /// Stream oracle output as it is generated
    #[arg(long, global = true)]
    stream: bool,

    /// Print notifications and logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Print Prometheus metrics before exiting
    #[arg(long, global = true)]
    metrics: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one question
    Ask {
        /// The request to act on
        question: String,
    },
    /// Process unprocessed `.md` emails, oldest first
    Inbox {
        /// Directory holding the emails
        #[arg(long, default_value = "emails", value_name = "DIR")]
        dir: PathBuf,
        /// Ledger file (defaults to processed_emails.json inside DIR)
        #[arg(long, value_name = "PATH")]
        ledger: Option<PathBuf>,
        /// Process every pending email instead of only the oldest
        #[arg(long)]
        all: bool,
    },
    /// List the provider's tools
    Tools,
}

impl Cli {
    fn config(&self) -> Result<AgentConfig> {
        let mut config = AgentConfig::from_env().context("Invalid ORDERPILOT_* environment")?;
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max) = self.max_iterations {
            config.max_iterations = max as usize;
        }
        if let Some(url) = &self.oracle_url {
            config.oracle_url = url.clone();
        }
        if let Some(url) = &self.mcp_url {
            config.mcp_url = url.clone();
        }
        if self.stream {
            config.stream = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config()?;

    if let Err(e) = orderpilot::tracing::init_tracing("orderpilot", config.otlp_endpoint.as_deref(), cli.json) {
        eprintln!("Failed to initialize tracing: {}", e);
    }

    let provider = Arc::new(McpClient::new(config.mcp_url.clone()));
    let oracle = ChatClient::new(config.oracle_url.clone(), config.model.clone())
        .with_api_key(config.api_key.clone())
        .with_timeout(config.oracle_timeout);

    let result = match &cli.command {
        Command::Tools => list_tools(&provider).await,
        Command::Ask { question } => {
            let controller = AgentController::new(Arc::new(oracle), provider, config);
            let reason = run_question(&controller, question, cli.json).await;
            info!(reason = reason.label(), "Question finished");
            Ok(())
        }
        Command::Inbox { dir, ledger, all } => {
            let controller = AgentController::new(Arc::new(oracle), provider, config);
            let ledger_path = ledger.clone().unwrap_or_else(|| dir.join("processed_emails.json"));
            process_inbox(&controller, dir, &ledger_path, *all, cli.json).await
        }
    };

    if cli.metrics {
        print!("{}", orderpilot::metrics::gather_text());
    }
    orderpilot::tracing::shutdown_tracing();
    result
}

async fn list_tools(provider: &McpClient) -> Result<()> {
    let tools = provider
        .list_tools()
        .await
        .with_context(|| format!("Failed to list tools from {}", provider.endpoint()))?;
    if tools.is_empty() {
        println!("No tools available");
    }
    for tool in tools {
        println!("{:<24} {}", tool.name, tool.description);
    }
    Ok(())
}

/// Print every notification of one loop and return its terminal reason
async fn run_question(controller: &AgentController, question: &str, json: bool) -> TerminalReason {
    let config = controller.config();
    info!(model = %config.model, max_iterations = config.max_iterations, stream = config.stream, "Running question");
    let notifications = controller.run(question);
    pin_mut!(notifications);

    let mut reason = TerminalReason::TaskComplete;
    while let Some(note) = notifications.next().await {
        print_notification(&note, json);
        if let Some(terminal) = note.terminal_reason {
            reason = terminal;
        }
    }
    reason
}

fn print_notification(note: &ProgressNotification, json: bool) {
    if json {
        match serde_json::to_string(note) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Failed to encode notification"),
        }
        return;
    }

    match note.kind {
        ProgressKind::Step => println!("\n[AGENT] {}", note.content_text()),
        ProgressKind::DecisionChunk => {
            use std::io::Write;
            print!("{}", note.content_text());
            let _ = std::io::stdout().flush();
        }
        ProgressKind::ToolCalls => println!("\n[AGENT] Calling tools: {}", note.content_text()),
        ProgressKind::ToolResults => println!("[AGENT] Called tools: {}", note.content_text()),
        ProgressKind::Error => println!("[AGENT] Oracle error: {}", note.content_text()),
        ProgressKind::Complete => println!(
            "\n[AGENT] {} ({}, {} iterations)",
            note.content["message"].as_str().unwrap_or("Task completed"),
            note.content["reason"].as_str().unwrap_or_default(),
            note.content["iterations"]
        ),
    }
}

async fn process_inbox(
    controller: &AgentController,
    dir: &Path,
    ledger_path: &Path,
    all: bool,
    json: bool,
) -> Result<()> {
    let mut ledger = InboxLedger::load(ledger_path);
    info!(ledger = %ledger.path().display(), processed = ledger.len(), "Loaded email ledger");

    loop {
        let Some(email) = ledger.next_pending(dir).context("Failed to scan inbox")? else {
            info!(dir = %dir.display(), "No unprocessed emails");
            break;
        };
        let name = email_name(&email);
        info!(email = %name, "Processing email");

        let status = match tokio::fs::read_to_string(&email).await {
            Ok(body) => match run_question(controller, &body, json).await {
                TerminalReason::BudgetExhausted => {
                    "agent_error: iteration budget exhausted".to_string()
                }
                _ => STATUS_COMPLETED.to_string(),
            },
            Err(e) => {
                warn!(email = %name, error = %e, "Failed to read email");
                format!("read_error: {}", e)
            }
        };

        ledger.mark(name, status);
        ledger.save().context("Failed to save email ledger")?;

        if !all {
            break;
        }
    }
    Ok(())
}
