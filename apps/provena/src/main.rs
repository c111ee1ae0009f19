//! # Provena - Composition Tracing Server
//!
//! The main binary for the Provena provenance graph.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for graph operations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                apps/provena (THE BINARY)             │
//! │                                                      │
//! │   ┌─────────────┐           ┌─────────────┐          │
//! │   │   CLI       │           │   HTTP API  │          │
//! │   │  (clap)     │           │   (axum)    │          │
//! │   └──────┬──────┘           └──────┬──────┘          │
//! │          │                        │                  │
//! │          └───────────┬────────────┘                  │
//! │                      ▼                               │
//! │              ┌───────────────┐                       │
//! │              │ provena-core  │                       │
//! │              │  (THE GRAPH)  │                       │
//! │              └───────────────┘                       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! provena server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! provena status
//! provena ingest -i img:sha256:aaa -f image.json -t layered-image
//! provena trace-composition -a img:sha256:aaa -d 3
//! ```

use clap::Parser;
use provena::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — PROVENA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PROVENA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "provena=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Provena startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗ ██████╗  ██████╗ ██╗   ██╗███████╗███╗   ██╗ █████╗
  ██╔══██╗██╔══██╗██╔═══██╗██║   ██║██╔════╝████╗  ██║██╔══██╗
  ██████╔╝██████╔╝██║   ██║██║   ██║█████╗  ██╔██╗ ██║███████║
  ██╔═══╝ ██╔══██╗██║   ██║╚██╗ ██╔╝██╔══╝  ██║╚██╗██║██╔══██║
  ██║     ██║  ██║╚██████╔╝ ╚████╔╝ ███████╗██║ ╚████║██║  ██║
  ╚═╝     ╚═╝  ╚═╝ ╚═════╝   ╚═══╝  ╚══════╝╚═╝  ╚═══╝╚═╝  ╚═╝

  Composition Tracing Server v{}

  Deterministic • Idempotent • Inspectable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
