//! Sovereign CLI - offline queue and sync from the terminal
//!
//! Runs sync cycles, the background push task and the connectivity scheduler
//! against the same store file the app uses.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::cache::run_cache;
use crate::commands::common::CliContext;
use crate::commands::mirror::{run_countries, run_projects};
use crate::commands::queue::run_queue;
use crate::commands::status::run_status;
use crate::commands::sync::{run_background_sync, run_sync, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "sovereign=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let context = CliContext::resolve(cli.db_path, cli.config)?;

    match cli.command {
        Commands::Sync { json } => run_sync(&context, json).await?,
        Commands::BackgroundSync => run_background_sync(&context).await?,
        Commands::Watch { probe_interval } => run_watch(&context, probe_interval).await?,
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::Queue { command } => run_queue(&context, command).await?,
        Commands::Cache { command } => run_cache(&context, command).await?,
        Commands::Countries { limit, json } => run_countries(&context, limit, json).await?,
        Commands::Projects { limit, json } => run_projects(&context, limit, json).await?,
        Commands::Auth { command } => run_auth(&context, command)?,
    }

    Ok(())
}
