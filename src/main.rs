#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::Result;
use clap::{Parser, Subcommand};
use mentionrelay::bedrock::BedrockClient;
use mentionrelay::dedup::EventLedger;
use mentionrelay::gateway::{self, AppState};
use mentionrelay::orchestrator::Orchestrator;
use mentionrelay::slack::SlackClient;
use mentionrelay::Config;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "mentionrelay")]
#[command(version)]
#[command(about = "Slack mention bot that relays thread context to AWS Bedrock", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP listener for Slack Events API deliveries
    #[command(long_about = "\
Run the HTTP listener for Slack Events API deliveries.

Point the Slack app's event subscription request URL at
http://<host>:<port>/slack/events. All configuration comes from the
environment; run 'mentionrelay check' to see what is missing.

Examples:
  mentionrelay serve
  mentionrelay serve --port 8080 --host 0.0.0.0")]
    Serve {
        /// Port to listen on (default: PORT env var, else 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Report which required and optional environment variables are set
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match cli.command {
        Commands::Serve { port, host } => {
            let config = Config::from_env()?;
            let port = port.unwrap_or(config.port);

            let slack = SlackClient::new(config.slack_bot_token);
            let bedrock = BedrockClient::new(config.aws, config.bedrock_model_id);
            let orchestrator = Orchestrator::new(slack, bedrock, config.prompt_dir);
            let state = AppState {
                orchestrator: Arc::new(orchestrator),
                ledger: Arc::new(EventLedger::new()),
                signing_secret: config.slack_signing_secret.into(),
            };

            info!("🚀 Starting mentionrelay on {host}:{port}");
            println!("🤖 mentionrelay listening on http://{host}:{port}");
            println!("   POST /slack/events   Slack Events API request URL");
            println!("   GET  /health         liveness probe");
            println!("   Press Ctrl+C to stop.");

            gateway::run(&host, port, state).await
        }
        Commands::Check => {
            run_check();
            Ok(())
        }
    }
}

const REQUIRED_VARS: [&str; 5] = [
    "SLACK_BOT_TOKEN",
    "SLACK_SIGNING_SECRET",
    "BEDROCK_MODEL_ID",
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
];

/// Print a ✅/❌ report of the environment without starting anything.
fn run_check() {
    println!("🔎 mentionrelay environment check\n");

    println!("Required:");
    let mut missing = 0;
    for name in REQUIRED_VARS {
        if is_set(name) {
            println!("  ✅ {name}");
        } else {
            println!("  ❌ {name} (not set)");
            missing += 1;
        }
    }

    println!("\nOptional:");
    print_optional("AWS_SESSION_TOKEN", "unset");
    print_optional("AWS_REGION", "ap-northeast-2");
    print_optional("PORT", "3000");
    print_optional("PROMPT_DIR", ".");

    println!("\nThe system prompt for a bot lives at <PROMPT_DIR>/system_prompt_<BOT_USER_ID>.txt.");
    if missing == 0 {
        println!("✅ All required variables are set.");
    } else {
        println!("❌ {missing} required variable(s) missing; 'serve' will refuse to start.");
    }
}

fn is_set(name: &str) -> bool {
    std::env::var(name).map(|v| !v.trim().is_empty()).unwrap_or(false)
}

fn print_optional(name: &str, default: &str) {
    if is_set(name) {
        println!("  ✅ {name} (set)");
    } else {
        println!("  ◦ {name} (default: {default})");
    }
}
