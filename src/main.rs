mod api;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod services;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "pickem")]
#[command(about = "NFL pick'em league backend: one winner pick per participant and week")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Initialize and seed the database
    InitDb,
    /// Pull a week's schedule and final scores from ESPN
    Sync {
        #[arg(short, long)]
        week: Option<i64>,
    },
    /// Print the current leaderboard
    Standings,
    /// Show the result audit trail of a match
    Audit {
        #[arg(short, long)]
        match_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = AppConfig::from_env()?;
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.port = port;
            }
            tracing::info!("Starting pick'em API server on port {}", config.port);
            api::serve(config).await?;
        }
        Some(Commands::InitDb) => {
            tracing::info!("Initializing database...");
            cli::init_db(&config).await?;
        }
        Some(Commands::Sync { week }) => {
            cli::sync_week(&config, week).await?;
        }
        Some(Commands::Standings) => {
            cli::print_standings(&config).await?;
        }
        Some(Commands::Audit { match_id }) => {
            cli::print_audit(&config, match_id).await?;
        }
        None => {
            tracing::info!("Starting pick'em API server on port {}", config.port);
            api::serve(config).await?;
        }
    }

    Ok(())
}
