//! # Provena CLI Module
//!
//! This module implements the CLI interface for Provena.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show graph status
//! - `ingest` - Ingest an artifact from a file
//! - `trace-composition` - Trace what an artifact is composed of
//! - `trace-usage` - Trace which artifacts carry a source location
//! - `report` - Show the stored ingestion report for an artifact
//! - `init` - Initialize new database

mod commands;

use clap::{Parser, Subcommand};
use provena_core::TraceError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Provena - Composition Tracing Server
///
/// A provenance graph over built artifacts: which components each
/// artifact embeds and which source revisions those components were
/// built from.
#[derive(Parser, Debug)]
#[command(name = "provena")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the graph database
    #[arg(short = 'D', long, global = true, default_value = "provena.db")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "memory" (ephemeral)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Path to the TOML configuration file
    #[arg(short = 'c', long, global = true, default_value = "provena.toml")]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show graph status
    Status,

    /// Ingest an artifact from a file
    Ingest {
        /// Stable artifact identifier (checksum plus build reference)
        #[arg(short, long)]
        id: String,

        /// Path to the artifact content file
        #[arg(short, long)]
        file: PathBuf,

        /// Declared artifact format (layered-image, archive, package, binary)
        #[arg(short = 't', long, default_value = "other")]
        format: String,
    },

    /// Trace what an artifact is composed of
    TraceComposition {
        /// Artifact identifier to trace from
        #[arg(short, long)]
        artifact: String,

        /// Traversal depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Traverse without a depth bound
        #[arg(short, long)]
        unbounded: bool,
    },

    /// Trace which artifacts carry code from a source location
    TraceUsage {
        /// Source repository URL
        #[arg(short = 'p', long)]
        repository: String,

        /// Source revision
        #[arg(short = 'r', long)]
        revision: String,

        /// Traversal depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Traverse without a depth bound
        #[arg(short, long)]
        unbounded: bool,
    },

    /// Show the stored ingestion report for an artifact
    Report {
        /// Artifact identifier
        #[arg(short, long)]
        artifact: String,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), TraceError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            cmd_server(&cli.database, backend, &cli.config, host, port).await
        }
        Some(Commands::Status) => cmd_status(&cli.database, backend, json_mode),
        Some(Commands::Ingest { id, file, format }) => {
            cmd_ingest(&cli.database, backend, json_mode, &id, &file, &format)
        }
        Some(Commands::TraceComposition {
            artifact,
            depth,
            unbounded,
        }) => cmd_trace_composition(&cli.database, backend, json_mode, &artifact, depth, unbounded),
        Some(Commands::TraceUsage {
            repository,
            revision,
            depth,
            unbounded,
        }) => cmd_trace_usage(
            &cli.database,
            backend,
            json_mode,
            &repository,
            &revision,
            depth,
            unbounded,
        ),
        Some(Commands::Report { artifact }) => {
            cmd_report(&cli.database, backend, json_mode, &artifact)
        }
        Some(Commands::Init { force }) => cmd_init(&cli.database, backend, force),
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.database, backend, json_mode)
        }
    }
}
