//! # Provena HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `POST /ingest` - Ingest an artifact (descriptor + base64 content)
//! - `GET /trace/composition` - Trace what an artifact is composed of
//! - `GET /trace/usage` - Trace which artifacts carry a source location
//! - `GET /report/{artifact}` - Stored ingestion report for an artifact
//! - `GET /status` - Graph status (node/edge counts)
//! - `GET /health` - Health check
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `PROVENA_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `provena::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    health_handler, ingest_handler, report_handler, status_handler, trace_composition_handler,
    trace_usage_handler,
};
#[allow(unused_imports)]
pub use types::{
    CompositionParams, ErrorResponse, HealthResponse, IngestRequest, IngestResponse,
    LineageEdgeJson, LineageNodeJson, LineageResponse, StatusResponse, UsageParams,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use provena_core::{Engine, TraceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the engine.
#[derive(Clone)]
pub struct AppState {
    /// The composition-tracing engine.
    pub engine: Arc<RwLock<Engine>>,
    /// Wall-clock budget for one ingestion's extraction phase.
    pub ingest_budget: Duration,
    /// Default trace depth when a query does not specify one.
    pub trace_depth: usize,
}

impl AppState {
    /// Create new app state with an engine and the server defaults.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        let config = Config::default();
        Self::with_config(engine, &config)
    }

    /// Create new app state with explicit configuration.
    #[must_use]
    pub fn with_config(engine: Engine, config: &Config) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
            ingest_budget: config.ingest_budget(),
            trace_depth: config.trace_depth,
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `PROVENA_CORS_ORIGINS` environment variable:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("PROVENA_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (PROVENA_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in PROVENA_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => {
            tracing::info!("CORS: No PROVENA_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit - caps ingested artifact payloads
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/ingest", post(handlers::ingest_handler))
        .route("/trace/composition", get(handlers::trace_composition_handler))
        .route("/trace/usage", get(handlers::trace_usage_handler))
        .route("/report/{artifact}", get(handlers::report_handler))
        .layer(axum::extract::DefaultBodyLimit::max(64 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, engine: Engine, config: &Config) -> Result<(), TraceError> {
    let state = AppState::with_config(engine, config);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| TraceError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Provena HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| TraceError::Io(format!("Server error: {}", e)))
}
