//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// classbook - books classes the moment registration opens
#[derive(Parser, Debug)]
#[command(name = "classbook")]
#[command(version)]
#[command(about = "Books capacity-limited classes the moment their registration window opens")]
#[command(
    long_about = "classbook keeps your class bookings in line with the v/x marks in the desired-state store: it books wanted classes the instant registration opens and cancels bookings you no longer want."
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load and validate the configuration
    Check,

    /// Show what the scheduler would do with the stored desired state
    Plan,

    /// Print the stored rows of one date partition as JSON
    Rows {
        /// Partition date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
    },
}
