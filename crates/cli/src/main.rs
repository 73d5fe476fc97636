//! Parley CLI — the main entry point.
//!
//! Commands:
//! - `init`      — Write a starter config and sample flow
//! - `validate`  — Load a flow and report every violation
//! - `simulate`  — Run a scripted conversation through the engine
//! - `status`    — Show a stored conversation (or list them all)
//! - `reset`     — Send a stored conversation back to its initial state
//! - `doctor`    — Diagnose the local setup

use clap::{Parser, Subcommand};
use parley_config::AppConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley — conversational decision engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config.toml and sample flow
    Init {
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },

    /// Validate a flow file
    Validate {
        /// Flow file (defaults to `flow_path` from the config)
        #[arg(short, long, env = "PARLEY_FLOW_PATH")]
        flow: Option<PathBuf>,
    },

    /// Run a scripted conversation
    Simulate {
        /// TOML script of turns
        #[arg(short, long)]
        script: PathBuf,

        /// Flow file (defaults to `flow_path` from the config)
        #[arg(short, long)]
        flow: Option<PathBuf>,

        /// Persist the conversation to the configured store
        #[arg(long)]
        save: bool,

        /// Print the full decision trace for each turn
        #[arg(long)]
        trace: bool,
    },

    /// Show a stored conversation, or list stored conversations
    Status {
        conversation_id: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reset a stored conversation to the flow's initial state
    Reset { conversation_id: String },

    /// Diagnose the local setup
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Config problems are reported by the commands themselves
    let logging = AppConfig::load().map(|c| c.logging).unwrap_or_default();
    let level = if cli.verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json || logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Init { force } => commands::init::run(force).await?,
        Commands::Validate { flow } => commands::validate::run(flow).await?,
        Commands::Simulate {
            script,
            flow,
            save,
            trace,
        } => commands::simulate::run(script, flow, save, trace).await?,
        Commands::Status {
            conversation_id,
            json,
        } => commands::status::run(conversation_id, json).await?,
        Commands::Reset { conversation_id } => commands::reset::run(conversation_id).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
