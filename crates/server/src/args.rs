//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Automated purchasing of limited-availability storefront tickets.
///
/// Without a subcommand the job service is started.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version)]
pub struct Cli {
    /// Configuration file [env: TURNSTILE_CONFIG] [default: turnstile.toml]
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Serve the purchase job API
    Serve,

    /// Execute the [purchase] section of the configuration once
    #[command(after_help = "\
Examples:
  turnstile run                         # Use ./turnstile.toml
  turnstile run -c show.toml            # Another configuration file
  TURNSTILE_PURCHASE__NUMBER_OF_TICKETS=3 turnstile run")]
    Run,
}
