//! Shelfwise CLI - resilient product recommendations
//!
//! Feeds JSON request bodies through the recommendation handlers and prints
//! the JSON response on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

/// Shelfwise: AI recommendations that degrade to local ones instead of failing
#[derive(Parser)]
#[command(name = "shelfwise")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Runtime config file (YAML)
    #[arg(short, long, global = true, env = "SHELFWISE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend items for a request body
    Recommend {
        /// Request file (JSON), or "-" for stdin
        #[arg(short, long)]
        request: PathBuf,

        /// Time budget for the request, e.g. "5s" (defaults to the configured deadline)
        #[arg(short, long, value_parser = humantime::parse_duration)]
        deadline: Option<Duration>,

        /// Also print the circuit breaker status
        #[arg(long)]
        status: bool,
    },

    /// Record a recommendation interaction
    Interaction {
        /// Interaction file (JSON), or "-" for stdin
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Print the effective configuration and credential status
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs on stderr so stdout stays machine-readable
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Recommend {
            request,
            deadline,
            status,
        } => commands::recommend(config, &request, deadline, status).await,
        Commands::Interaction { request } => commands::interaction(config, &request).await,
        Commands::Config => commands::show_config(config),
    }
}
