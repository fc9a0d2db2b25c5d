//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::run::RunArgs;

/// Work time tracker.
///
/// Times work against work orders and activities, pausing on request or when
/// you walk away, and saves each session as a billable time entry.
#[derive(Debug, Parser)]
#[command(name = "wt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run an interactive timer session.
    Run(RunArgs),

    /// List saved time entries.
    Entries {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the work orders and activities that can be bound.
    Catalog,
}
