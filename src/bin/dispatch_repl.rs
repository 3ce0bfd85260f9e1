//! Interactive dispatcher REPL
//!
//! Reads one utterance per line from stdin and prints the turn outcome.
//!
//! Usage:
//!   cargo run --features cli --bin dispatch_repl -- \
//!     --tools-url http://localhost:9000 \
//!     --user alice --role analyst --email alice@example.com
//!
//! Without an API key for `AGENT_BACKEND`, the decision steps run on their
//! deterministic paths only.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use turn_dispatch::agentic::create_llm_client;
use turn_dispatch::pending::spawn_sweeper;
use turn_dispatch::tools::{HttpTools, InMemorySessionHistory, RecipientDirectory};
use turn_dispatch::{
    DispatchConfig, PendingActionStore, TurnKind, TurnRequest, TurnResponse, WorkflowEngine,
};

/// Conversational turn dispatcher
#[derive(Parser, Debug)]
#[command(name = "dispatch_repl")]
#[command(about = "Dispatch natural-language requests to query, report and notify tools")]
struct Args {
    /// YAML config file (defaults plus DISPATCH_* overrides when omitted)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Base URL of the tool service
    #[arg(long, env = "TOOLS_BASE_URL", default_value = "http://localhost:9000")]
    tools_url: String,

    /// Session id (random when omitted)
    #[arg(long, short = 's')]
    session: Option<String>,

    #[arg(long, short = 'u', default_value = "local-user")]
    user: String,

    #[arg(long, short = 'r', default_value = "analyst")]
    role: String,

    /// Address used when a request says "send it to me"
    #[arg(long, env = "DISPATCH_USER_EMAIL")]
    email: Option<String>,
}

/// Resolves every user to the single address given on the command line
struct SingleUserDirectory {
    address: Option<String>,
}

#[async_trait]
impl RecipientDirectory for SingleUserDirectory {
    async fn address_for(&self, _user_id: &str) -> Result<Option<String>> {
        Ok(self.address.clone())
    }
}

fn load_config(args: &Args) -> Result<DispatchConfig> {
    let config = match &args.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            let mut config = DispatchConfig::load(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config.validate()?;
            config
        }
        None => DispatchConfig::from_env()?,
    };
    Ok(config)
}

fn print_response(response: &TurnResponse) {
    match response.kind {
        TurnKind::Clarification => println!("? {}", response.answer),
        TurnKind::ConfirmationPrompt => println!("! {}", response.answer),
        TurnKind::ConfirmationResolved | TurnKind::Answered => {
            let marker = if response.success { ">" } else { "x" };
            println!("{} {}", marker, response.answer);
        }
    }
    if !response.tools_used.is_empty() {
        println!("  [tools: {}]", response.tools_used.join(" -> "));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "turn_dispatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(&args).context("Failed to load dispatcher config")?;
    let session_id = args
        .session
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let tools = Arc::new(HttpTools::new(args.tools_url.clone()));
    let history = Arc::new(InMemorySessionHistory::with_capacity(config.history_capacity));
    let pending = PendingActionStore::in_memory(config.pending_ttl());
    let sweeper = spawn_sweeper(
        pending.clone(),
        config.sweep_interval(),
        config.pending_retention(),
    );

    let mut builder = WorkflowEngine::builder(config)
        .query_tool(tools.clone())
        .report_tool(tools.clone())
        .notify_tool(tools.clone())
        .action_executor(tools)
        .history(history.clone())
        .pending_store(pending)
        .recipients(Arc::new(SingleUserDirectory {
            address: args.email.clone(),
        }));

    match create_llm_client() {
        Ok(client) => builder = builder.llm(client),
        Err(e) => tracing::warn!(error = %e, "No LLM client, using deterministic decisions only"),
    }
    let engine = builder.build()?;

    tracing::info!(session_id = %session_id, user = %args.user, "Dispatcher ready");
    println!("Session {} (Ctrl-D to quit)", session_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let request = TurnRequest::new(&session_id, &args.user, &args.role, line.trim());
        let response = engine.handle_turn(request).await;
        print_response(&response);

        history
            .record_exchange(&session_id, &args.user, line.trim(), response.history_entry())
            .await;
    }

    sweeper.abort();
    Ok(())
}
