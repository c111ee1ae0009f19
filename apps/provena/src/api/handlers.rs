//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Ingestion runs its extraction phase on the blocking pool while the
//! engine lock is free, then commits under the write lock. Distinct
//! artifacts extract in parallel and only serialize on the commit.

use super::{
    AppState,
    types::{
        CompositionParams, ErrorResponse, HealthResponse, IngestRequest, IngestResponse,
        LineageResponse, StatusResponse, UsageParams,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use provena_core::{
    ArtifactId, CancelFlag, DispatchLimits, Dispatcher, SourceLocation, TraceDepth, TraceError,
    TraceOptions,
};
use std::time::Instant;

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Map an engine error onto an HTTP status.
fn error_status(error: &TraceError) -> StatusCode {
    match error {
        TraceError::NotFound(_) => StatusCode::NOT_FOUND,
        TraceError::StructuralConflict(_) | TraceError::StoreConflict(_) => StatusCode::CONFLICT,
        TraceError::InvalidDescriptor(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TraceError::Serialization(_) | TraceError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Uniform error response body.
fn error_response(error: &TraceError) -> Response {
    (
        error_status(error),
        Json(ErrorResponse::new(error.to_string())),
    )
        .into_response()
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get graph status.
pub async fn status_handler(State(state): State<AppState>) -> Response {
    let engine = state.engine.read().await;

    let counts = engine
        .node_count()
        .and_then(|nodes| engine.edge_count().map(|edges| (nodes, edges)));

    match counts {
        Ok((node_count, edge_count)) => (
            StatusCode::OK,
            Json(StatusResponse {
                node_count,
                edge_count,
                persistent: engine.is_persistent(),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// INGEST HANDLER
// =============================================================================

/// Ingest an artifact.
///
/// Extraction happens on the blocking pool with only a brief read lock
/// taken to clone the registry handle; the commit takes the write lock.
pub async fn ingest_handler(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Response {
    let (descriptor, content) = match request.to_parts() {
        Ok(parts) => parts,
        Err(e) => return error_response(&e),
    };

    let registry = state.engine.read().await.registry();
    let limits = DispatchLimits::with_deadline(Instant::now() + state.ingest_budget);
    let cancel = CancelFlag::new();

    let harvest = tokio::task::spawn_blocking(move || {
        Dispatcher::dispatch(&registry, &descriptor, &content, &limits, &cancel)
    })
    .await;

    let harvest = match harvest {
        Ok(harvest) => harvest,
        Err(e) => {
            return error_response(&TraceError::Io(format!("extraction task failed: {}", e)));
        }
    };

    let result = {
        let mut engine = state.engine.write().await;
        engine.commit_harvest(&harvest)
    };

    match result {
        Ok(report) => (StatusCode::OK, Json(IngestResponse::from_report(&report))).into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// TRACE HANDLERS
// =============================================================================

/// Resolve trace options from query parameters.
fn trace_options(depth: Option<usize>, unbounded: bool, default_depth: usize) -> TraceOptions {
    let depth = if unbounded {
        TraceDepth::Unbounded
    } else {
        TraceDepth::Bounded(depth.unwrap_or(default_depth))
    };
    TraceOptions::with_depth(depth)
}

/// Trace what an artifact is composed of.
pub async fn trace_composition_handler(
    State(state): State<AppState>,
    Query(params): Query<CompositionParams>,
) -> Response {
    let artifact = ArtifactId::new(&params.artifact);
    let options = trace_options(params.depth, params.unbounded, state.trace_depth);

    let engine = state.engine.read().await;
    match engine.trace_composition(&artifact, &options) {
        Ok(lineage) => (
            StatusCode::OK,
            Json(LineageResponse::from_lineage(&lineage)),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Trace which artifacts transitively carry code from a source location.
pub async fn trace_usage_handler(
    State(state): State<AppState>,
    Query(params): Query<UsageParams>,
) -> Response {
    let source = SourceLocation::normalized(&params.repository, &params.revision);
    let options = trace_options(params.depth, params.unbounded, state.trace_depth);

    let engine = state.engine.read().await;
    match engine.trace_usage(&source, &options) {
        Ok(lineage) => (
            StatusCode::OK,
            Json(LineageResponse::from_lineage(&lineage)),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

// =============================================================================
// REPORT HANDLER
// =============================================================================

/// Fetch the stored ingestion report for an artifact.
pub async fn report_handler(
    State(state): State<AppState>,
    Path(artifact): Path<String>,
) -> Response {
    let artifact = ArtifactId::new(artifact);

    let engine = state.engine.read().await;
    match engine.report(&artifact) {
        Ok(Some(report)) => {
            (StatusCode::OK, Json(IngestResponse::from_report(&report))).into_response()
        }
        Ok(None) => error_response(&TraceError::NotFound(format!(
            "no ingestion report for {}",
            artifact.as_str()
        ))),
        Err(e) => error_response(&e),
    }
}
