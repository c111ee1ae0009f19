//! Integration tests for the Provena HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum_test::TestServer;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use provena::api::{
    AppState, ErrorResponse, HealthResponse, IngestResponse, LineageResponse, StatusResponse,
    create_router,
};
use provena_core::{Engine, IngestStatus, RelationKind};
use serde_json::json;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a test server with a fresh in-memory engine.
fn create_test_server() -> TestServer {
    let state = AppState::new(Engine::new());
    let router = create_router(state);
    TestServer::new(router).unwrap()
}

/// A small container image fixture: one layer carrying a Go binary.
///
/// The binary embeds two modules and pins the app module to a git
/// revision, so a full ingest produces artifacts, components and a
/// source location.
fn sample_image_body() -> serde_json::Value {
    let binary = "mod\texample.com/app\t1.2.0\n\
                  dep\texample.com/lib\t0.9.1\n\
                  repo\texample.com/app\thttps://github.com/org/app.git\tDEADBEEF\n";
    let layer = json!({
        "entries": [
            {"name": "usr/bin/app", "format": "binary", "content": BASE64.encode(binary)},
        ]
    });
    let manifest = json!({
        "layers": [
            {"digest": "sha256:layer0", "format": "archive", "content": BASE64.encode(layer.to_string())},
        ]
    });
    json!({
        "id": "registry.example.com/app@sha256:f00d",
        "format": "layered-image",
        "content_base64": BASE64.encode(manifest.to_string()),
    })
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// STATUS ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_status_empty_graph() {
    let server = create_test_server();

    let response = server.get("/status").await;

    response.assert_status_ok();
    let status: StatusResponse = response.json();
    assert_eq!(status.node_count, 0);
    assert_eq!(status.edge_count, 0);
    assert!(!status.persistent);
}

// =============================================================================
// INGEST ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_ingest_image_succeeds() {
    let server = create_test_server();

    let response = server.post("/ingest").json(&sample_image_body()).await;

    response.assert_status_ok();
    let ingest: IngestResponse = response.json();
    assert_eq!(ingest.artifact, "registry.example.com/app@sha256:f00d");
    assert_eq!(ingest.status, IngestStatus::Complete);
    assert!(ingest.failed == 0);
    assert!(ingest.succeeded >= 2);

    // The graph is populated afterwards.
    let status: StatusResponse = server.get("/status").await.json();
    assert!(status.node_count >= 4);
    assert!(status.edge_count >= 3);
}

#[tokio::test]
async fn test_ingest_rejects_empty_id() {
    let server = create_test_server();

    let response = server
        .post("/ingest")
        .json(&json!({
            "id": "",
            "content_base64": BASE64.encode(b"x"),
        }))
        .await;

    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = response.json();
    assert!(error.error.contains("artifact id"));
}

#[tokio::test]
async fn test_ingest_rejects_bad_base64() {
    let server = create_test_server();

    let response = server
        .post("/ingest")
        .json(&json!({
            "id": "bin:sha256:aaa",
            "content_base64": "!!! not base64 !!!",
        }))
        .await;

    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_ingest_malformed_content_reports_failure() {
    let server = create_test_server();

    // Declared as an image but the manifest does not parse.
    let response = server
        .post("/ingest")
        .json(&json!({
            "id": "img:sha256:broken",
            "format": "layered-image",
            "content_base64": BASE64.encode(b"not a manifest"),
        }))
        .await;

    // Extraction failures are absorbed into the report, not HTTP errors.
    response.assert_status_ok();
    let ingest: IngestResponse = response.json();
    assert_eq!(ingest.status, IngestStatus::Failed);
    assert!(ingest.failed >= 1);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let server = create_test_server();
    let body = sample_image_body();

    server.post("/ingest").json(&body).await.assert_status_ok();
    let first: StatusResponse = server.get("/status").await.json();

    server.post("/ingest").json(&body).await.assert_status_ok();
    let second: StatusResponse = server.get("/status").await.json();

    assert_eq!(first.node_count, second.node_count);
    assert_eq!(first.edge_count, second.edge_count);
}

#[tokio::test]
async fn test_cross_ingestion_cycle_returns_conflict() {
    let server = create_test_server();

    // An image whose layer digest names another image's identity.
    let image = |id: &str, layer_digest: &str, content: &[u8]| {
        let manifest = json!({
            "layers": [{"digest": layer_digest, "content": BASE64.encode(content)}]
        });
        json!({
            "id": id,
            "format": "layered-image",
            "content_base64": BASE64.encode(manifest.to_string()),
        })
    };

    // First image contains the second: CONTAINS(aaa -> bbb).
    server
        .post("/ingest")
        .json(&image("sha256:aaa", "sha256:bbb", b"layer-one"))
        .await
        .assert_status_ok();

    // The second claiming to contain the first would close the loop.
    let response = server
        .post("/ingest")
        .json(&image("sha256:bbb", "sha256:aaa", b"layer-two"))
        .await;

    response.assert_status(axum::http::StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert!(error.error.contains("cycle"));

    // The rejected batch wrote nothing but its failed report.
    let report: IngestResponse = server.get("/report/sha256:bbb").await.json();
    assert_eq!(report.status, IngestStatus::Failed);
}

// =============================================================================
// TRACE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_trace_composition_round_trip() {
    let server = create_test_server();
    server
        .post("/ingest")
        .json(&sample_image_body())
        .await
        .assert_status_ok();

    let response = server
        .get("/trace/composition")
        .add_query_param("artifact", "registry.example.com/app@sha256:f00d")
        .await;

    response.assert_status_ok();
    let lineage: LineageResponse = response.json();
    assert!(!lineage.truncated);
    assert_eq!(lineage.nodes[0].kind, "artifact");
    assert_eq!(lineage.nodes[0].depth, 0);
    // Image contains the layer; the layer embeds components.
    assert!(lineage.edges.iter().any(|e| e.kind == RelationKind::Contains));
    assert!(lineage.edges.iter().any(|e| e.kind == RelationKind::Embeds));
    assert!(
        lineage
            .nodes
            .iter()
            .any(|n| n.kind == "source-location")
    );
}

#[tokio::test]
async fn test_trace_composition_depth_bound() {
    let server = create_test_server();
    server
        .post("/ingest")
        .json(&sample_image_body())
        .await
        .assert_status_ok();

    let response = server
        .get("/trace/composition")
        .add_query_param("artifact", "registry.example.com/app@sha256:f00d")
        .add_query_param("depth", "1")
        .await;

    response.assert_status_ok();
    let lineage: LineageResponse = response.json();
    // Depth 1 reaches only the image and its layer.
    assert_eq!(lineage.nodes.len(), 2);
    assert!(lineage.nodes.iter().all(|n| n.kind == "artifact"));
}

#[tokio::test]
async fn test_trace_unknown_artifact_is_404() {
    let server = create_test_server();

    let response = server
        .get("/trace/composition")
        .add_query_param("artifact", "img:sha256:never-ingested")
        .await;

    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trace_usage_finds_embedding_artifacts() {
    let server = create_test_server();
    server
        .post("/ingest")
        .json(&sample_image_body())
        .await
        .assert_status_ok();

    // The repository URL normalizes: ".git" stripped, host lowercased.
    let response = server
        .get("/trace/usage")
        .add_query_param("repository", "https://GitHub.com/org/app.git")
        .add_query_param("revision", "deadbeef")
        .await;

    response.assert_status_ok();
    let lineage: LineageResponse = response.json();
    assert_eq!(lineage.nodes[0].kind, "source-location");
    // Reverse walk reaches the component, the layer and the image.
    assert!(lineage.nodes.iter().filter(|n| n.kind == "artifact").count() >= 2);
}

#[tokio::test]
async fn test_trace_usage_unknown_source_is_404() {
    let server = create_test_server();

    let response = server
        .get("/trace/usage")
        .add_query_param("repository", "https://example.com/absent")
        .add_query_param("revision", "0000")
        .await;

    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

// =============================================================================
// REPORT ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_report_round_trip() {
    let server = create_test_server();

    let binary = "mod\texample.com/tool\t2.0.0\n";
    server
        .post("/ingest")
        .json(&json!({
            "id": "bin:sha256:feed",
            "format": "binary",
            "content_base64": BASE64.encode(binary),
        }))
        .await
        .assert_status_ok();

    let response = server.get("/report/bin:sha256:feed").await;

    response.assert_status_ok();
    let report: IngestResponse = response.json();
    assert_eq!(report.artifact, "bin:sha256:feed");
    assert_eq!(report.status, IngestStatus::Complete);
    assert!(!report.outcomes.is_empty());
}

#[tokio::test]
async fn test_report_unknown_artifact_is_404() {
    let server = create_test_server();

    let response = server.get("/report/absent").await;

    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}
