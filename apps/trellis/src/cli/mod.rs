//! # Trellis CLI Module
//!
//! This module implements the CLI interface for Trellis.
//!
//! ## Available Commands
//!
//! - `run` - Execute an operation chain against a configured graph
//! - `schema` - Print the merged schema
//! - `operations` - List supported operations and store traits

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trellis_core::TrellisError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Trellis - schema-driven graph engine
///
/// Builds a graph from a TOML config and runs operation chains through
/// its hook pipeline.
#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute an operation chain
    Run {
        /// Path to the graph config (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Path to the chain document (JSON)
        #[arg(short, long)]
        file: PathBuf,

        /// User to run the chain as
        #[arg(short, long, default_value = trellis_core::UNKNOWN_USER_ID)]
        user: String,

        /// Operation auths held by the user (comma-separated)
        #[arg(long, value_delimiter = ',')]
        op_auths: Vec<String>,

        /// Run the chain as a job and report the job record
        #[arg(long)]
        job: bool,
    },

    /// Print the merged schema
    Schema {
        /// Path to the graph config (TOML)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List supported operations and store traits
    Operations {
        /// Path to the graph config (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Only list the operations that may follow this one
        #[arg(short, long)]
        next: Option<String>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), TrellisError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Run {
            config,
            file,
            user,
            op_auths,
            job,
        } => cmd_run(&config, &file, &user, &op_auths, job, json_mode),
        Commands::Schema { config } => cmd_schema(&config),
        Commands::Operations { config, next } => cmd_operations(&config, next.as_deref(), json_mode),
    }
}
