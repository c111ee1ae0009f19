//! # Application Configuration
//!
//! Configuration is loaded from an optional TOML file (`provena.toml`)
//! and then overridden by environment variables. CLI flags win over
//! both; that resolution happens in the CLI layer.
//!
//! ## Environment Variables
//!
//! - `PROVENA_DATABASE` - path to the graph database file
//! - `PROVENA_HOST` / `PROVENA_PORT` - server bind address
//! - `PROVENA_INGEST_BUDGET_MS` - wall-clock budget for one ingestion
//! - `PROVENA_TRACE_DEPTH` - default trace depth for queries

use provena_core::{TraceError, primitives::DEFAULT_TRACE_DEPTH};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default wall-clock budget for one ingestion (30 seconds).
pub const DEFAULT_INGEST_BUDGET_MS: u64 = 30_000;

/// Default server bind host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server bind port.
pub const DEFAULT_PORT: u16 = 8080;

// =============================================================================
// CONFIG STRUCTURE
// =============================================================================

/// Application configuration, resolved from file plus environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the graph database file.
    pub database: PathBuf,
    /// Host the HTTP server binds to.
    pub host: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Wall-clock budget for one ingestion, in milliseconds.
    pub ingest_budget_ms: u64,
    /// Default trace depth when a query does not specify one.
    pub trace_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("provena.db"),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ingest_budget_ms: DEFAULT_INGEST_BUDGET_MS,
            trace_depth: DEFAULT_TRACE_DEPTH,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment
    /// overrides. A missing file yields the defaults; a malformed file
    /// is an error.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| TraceError::Io(format!("read config {:?}: {}", path, e)))?;
            toml::from_str(&contents)
                .map_err(|e| TraceError::Serialization(format!("parse config {:?}: {}", path, e)))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `PROVENA_*` environment overrides in place.
    fn apply_env_overrides(&mut self) {
        if let Ok(database) = std::env::var("PROVENA_DATABASE") {
            self.database = PathBuf::from(database);
        }
        if let Ok(host) = std::env::var("PROVENA_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("PROVENA_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            self.port = port;
        }
        if let Ok(budget) = std::env::var("PROVENA_INGEST_BUDGET_MS")
            && let Ok(budget) = budget.parse::<u64>()
        {
            self.ingest_budget_ms = budget;
        }
        if let Ok(depth) = std::env::var("PROVENA_TRACE_DEPTH")
            && let Ok(depth) = depth.parse::<usize>()
        {
            self.trace_depth = depth;
        }
    }

    /// The socket address string the server binds to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The ingestion budget as a duration.
    #[must_use]
    pub fn ingest_budget(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ingest_budget_ms)
    }
}

// =============================================================================
// TESTS
// =============================================================================
