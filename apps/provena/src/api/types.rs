//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use provena_core::{
    ArtifactDescriptor, ArtifactFormat, ArtifactId, ContentHandle, ExtractorOutcome, IngestStatus,
    IngestionReport, Lineage, NodeKey, RelationKind, TraceError,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Graph status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_count: usize,
    pub edge_count: usize,
    pub persistent: bool,
}

// =============================================================================
// INGEST REQUEST/RESPONSE
// =============================================================================

/// Artifact ingest request.
///
/// The build connector submits the artifact identity, its declared
/// format, and the raw content base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Stable artifact identifier (checksum plus build reference).
    pub id: String,
    /// Declared format; unknown or absent values fall back to sniffing.
    #[serde(default)]
    pub format: Option<String>,
    /// Base64-encoded artifact content.
    pub content_base64: String,
}

impl IngestRequest {
    /// Convert to a descriptor plus content handle, validating fields.
    pub fn to_parts(&self) -> Result<(ArtifactDescriptor, ContentHandle), TraceError> {
        let id = ArtifactId::new(&self.id);
        id.validate()?;

        let format = self
            .format
            .as_deref()
            .map(ArtifactFormat::parse)
            .unwrap_or_default();

        let bytes = BASE64
            .decode(&self.content_base64)
            .map_err(|e| TraceError::InvalidDescriptor(format!("content_base64: {}", e)))?;

        Ok((
            ArtifactDescriptor::new(id, format),
            ContentHandle::from_bytes(bytes),
        ))
    }
}

/// Artifact ingest response: the ingestion report, flattened for wire use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub artifact: String,
    pub status: IngestStatus,
    pub succeeded: usize,
    pub failed: usize,
    pub outcomes: Vec<ExtractorOutcome>,
}

impl IngestResponse {
    /// Build a response from an ingestion report.
    #[must_use]
    pub fn from_report(report: &IngestionReport) -> Self {
        Self {
            artifact: report.artifact.as_str().to_string(),
            status: report.status,
            succeeded: report.succeeded_count(),
            failed: report.failed_count(),
            outcomes: report.outcomes.clone(),
        }
    }
}

// =============================================================================
// TRACE QUERY PARAMETERS
// =============================================================================

/// Query string for `GET /trace/composition`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompositionParams {
    /// Artifact identifier to trace from.
    pub artifact: String,
    /// Hop limit; absent means the server default.
    #[serde(default)]
    pub depth: Option<usize>,
    /// Explicit request for an unbounded traversal.
    #[serde(default)]
    pub unbounded: bool,
}

/// Query string for `GET /trace/usage`.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageParams {
    /// Source repository URL (normalized server-side).
    pub repository: String,
    /// Source revision.
    pub revision: String,
    #[serde(default)]
    pub depth: Option<usize>,
    #[serde(default)]
    pub unbounded: bool,
}

// =============================================================================
// LINEAGE RESPONSE
// =============================================================================

/// One node of a traced subgraph, wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageNodeJson {
    pub id: u64,
    /// One-word node kind (`artifact`, `component`, `source-location`).
    pub kind: String,
    pub key: NodeKey,
    /// Hop distance from the traversal start.
    pub depth: usize,
}

/// One edge of a traced subgraph, wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageEdgeJson {
    pub from: u64,
    pub kind: RelationKind,
    pub to: u64,
}

/// The induced subgraph of one trace query, wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineageResponse {
    pub root: u64,
    pub truncated: bool,
    pub nodes: Vec<LineageNodeJson>,
    pub edges: Vec<LineageEdgeJson>,
}

impl LineageResponse {
    /// Build a wire response from a traced lineage.
    #[must_use]
    pub fn from_lineage(lineage: &Lineage) -> Self {
        Self {
            root: lineage.root.0,
            truncated: lineage.truncated,
            nodes: lineage
                .nodes
                .iter()
                .map(|n| LineageNodeJson {
                    id: n.id.0,
                    kind: n.key.kind().to_string(),
                    key: n.key.clone(),
                    depth: n.depth,
                })
                .collect(),
            edges: lineage
                .edges
                .iter()
                .map(|e| LineageEdgeJson {
                    from: e.from.0,
                    kind: e.kind,
                    to: e.to.0,
                })
                .collect(),
        }
    }
}

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Uniform error body for non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    /// Wrap an error message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
