//! CLI module for Granska.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Granska - Media Analysis Tasks
///
/// A service that turns uploaded audio, images, documents, and URLs into
/// AI-generated analyses recorded as durable tasks. The name "Granska"
/// comes from the Scandinavian word for "examine."
#[derive(Parser, Debug)]
#[command(name = "granska")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file
    Init,

    /// Run the HTTP API server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// List task records from the store
    Tasks {
        /// Owner whose tasks to list
        #[arg(short, long)]
        owner: String,

        /// Filter by task kind (e.g. CONVERSATION_ANALYSIS)
        #[arg(short, long)]
        kind: Option<String>,

        /// Filter by status (e.g. COMPLETED)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of tasks to show
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Number of tasks to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Fail out PROCESSING tasks older than this many hours
        #[arg(long)]
        sweep_stale: Option<i64>,
    },
}
