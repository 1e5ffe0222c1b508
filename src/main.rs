// ABOUTME: Entry point for the stagehand CLI application.
// ABOUTME: Parses arguments, sets up tracing and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use stagehand::config::Manifest;
use stagehand::error::Result;
use stagehand::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("stagehand=debug,warn")
        } else if cli.quiet || cli.json {
            EnvFilter::new("warn")
        } else {
            EnvFilter::new("stagehand=info,warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);

    if let Err(e) = run(cli.command, Output::new(mode)).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(command: Commands, output: Output) -> Result<()> {
    let cwd = env::current_dir()?;
    let base = Manifest::discover(&cwd)?;

    match command {
        Commands::Deploy {
            version,
            environment,
            non_interactive,
        } => {
            let manifest = base.for_environment(&environment)?;
            commands::deploy(manifest, &version, &environment, non_interactive, output).await
        }
        Commands::Rollback { environment, yes } => {
            let manifest = base.for_environment(&environment)?;
            commands::rollback(manifest, &environment, yes, output).await
        }
        Commands::Status { environment } => {
            let manifest = base.for_environment(&environment)?;
            commands::status(manifest, output).await
        }
    }
}
