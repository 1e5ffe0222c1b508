// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};

pub const DEFAULT_ENVIRONMENT: &str = "production";

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Rolling releases for containerized services on a single host")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result (for CI)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a version to an environment
    Deploy {
        /// Version to deploy, used as the image tag
        version: String,

        /// Target environment (selects .env.<environment> and manifest overrides)
        #[arg(default_value = DEFAULT_ENVIRONMENT)]
        environment: String,

        /// Never prompt; a failed deployment is not rolled back
        #[arg(long)]
        non_interactive: bool,
    },

    /// Restore the latest backup and restart the stack
    Rollback {
        #[arg(default_value = DEFAULT_ENVIRONMENT)]
        environment: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the managed containers of the stack
    Status {
        #[arg(default_value = DEFAULT_ENVIRONMENT)]
        environment: String,
    },
}
