//! Command-line interface argument parsing and definitions

use clap::{Parser, Subcommand};
use is_terminal::IsTerminal;
use std::path::PathBuf;

/// Bulwark CLI - resilient requests against an admin API
///
/// Every request goes through the same timeout, retry and session handling
/// the console uses, so the CLI reproduces what a screen would see.
#[derive(Parser, Debug)]
#[command(
    name = "bulwark",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, global = true, env = "BULWARK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL override
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Session token to attach to every request
    #[arg(long, global = true, env = "BULWARK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a single request and print the response body
    Send(SendArgs),

    /// Run a file of requests in bounded-concurrency windows
    Batch(BatchArgs),
}

/// Arguments for the send command
#[derive(Parser, Debug)]
pub struct SendArgs {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    #[arg(value_name = "METHOD")]
    pub method: String,

    /// Path relative to the base URL, starting with '/'
    #[arg(value_name = "PATH")]
    pub path: String,

    /// JSON request body
    #[arg(short, long, value_name = "JSON")]
    pub body: Option<String>,

    /// Explicit timeout, overriding the category timeout
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Extra header, as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,
}

/// Arguments for the batch command
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// JSON file with an array of requests, or {"requests": [...], "options": {...}}
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Window size
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Abort on the first failed request
    #[arg(long)]
    pub fail_fast: bool,

    /// Make a single attempt per request
    #[arg(long)]
    pub no_retry: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stderr().is_terminal()
    }
}
