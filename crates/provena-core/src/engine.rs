//! # Engine
//!
//! The top-level ingestion and query surface, combining an extractor
//! registry with a storage backend.
//!
//! One `ingest` call runs the full pipeline: dispatch, normalization,
//! assembly validation, atomic commit, report persistence. The engine is
//! synchronous; callers that want concurrency run dispatch on their own
//! threads via `Dispatcher` and hand the harvest to `commit_harvest`.
//!
//! ## Storage Backends
//!
//! - `InMemory`: volatile `MemoryGraph` (fast, lost on drop)
//! - `Persistent`: disk-backed `RedbStore` (ACID, survives restarts)

use crate::assemble::{Assembler, MutationSet};
use crate::content::ContentHandle;
use crate::dispatch::{CancelFlag, DispatchLimits, Dispatcher, Harvest, Registry};
use crate::graph::{MemoryGraph, ProvStore};
use crate::normalize::Normalizer;
use crate::query::{self, Lineage, TraceOptions};
use crate::storage::RedbStore;
use crate::{
    ArtifactDescriptor, ArtifactId, ExtractionFailure, ExtractorOutcome, FailureKind,
    IngestionReport, OutcomeKind, SourceLocation, TraceError,
};
use std::path::Path;
use std::sync::Arc;

/// Storage backend for an Engine.
#[derive(Debug)]
pub enum StoreBackend {
    /// In-memory graph (fast, volatile).
    InMemory(MemoryGraph),
    /// Disk-backed graph using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::InMemory(MemoryGraph::new())
    }
}

// NOTE: StoreBackend does NOT implement Clone; the redb database handle
// cannot be safely cloned.

/// The composition-tracing engine.
#[derive(Debug, Default)]
pub struct Engine {
    /// The storage backend (in-memory or persistent).
    backend: StoreBackend,
    /// The extractor registry, shared so dispatch can run off-engine.
    registry: Arc<Registry>,
}

impl Engine {
    /// A new engine with in-memory storage and the default extractors.
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: StoreBackend::default(),
            registry: Arc::new(Registry::with_defaults()),
        }
    }

    /// An engine over an existing in-memory graph.
    #[must_use]
    pub fn with_graph(graph: MemoryGraph) -> Self {
        Self {
            backend: StoreBackend::InMemory(graph),
            registry: Arc::new(Registry::with_defaults()),
        }
    }

    /// An engine with persistent redb storage at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let store = RedbStore::open(path)?;
        Ok(Self {
            backend: StoreBackend::Persistent(store),
            registry: Arc::new(Registry::with_defaults()),
        })
    }

    /// Replace the extractor registry.
    pub fn set_registry(&mut self, registry: Registry) {
        self.registry = Arc::new(registry);
    }

    /// The shared extractor registry.
    #[must_use]
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Whether this engine uses persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StoreBackend::Persistent(_))
    }

    // =========================================================================
    // INGESTION
    // =========================================================================

    /// Ingest one artifact: extract, normalize, validate, commit.
    ///
    /// Per-extractor failures are isolated into the report rather than
    /// failing the call. A cancelled ingestion returns its report without
    /// any graph write. A CONTAINS cycle rejects the whole batch, records
    /// a failed report, and surfaces as `StructuralConflict`.
    pub fn ingest(
        &mut self,
        descriptor: &ArtifactDescriptor,
        content: &ContentHandle,
        limits: &DispatchLimits,
        cancel: &CancelFlag,
    ) -> Result<IngestionReport, TraceError> {
        descriptor.id.validate()?;
        let harvest = Dispatcher::dispatch(&self.registry, descriptor, content, limits, cancel);

        if cancel.is_cancelled() {
            // The transaction is never attempted.
            let mut report = IngestionReport::pending(descriptor.id.clone());
            report.outcomes = harvest.outcomes;
            report.status = report.resolve_status();
            return Ok(report);
        }

        self.commit_harvest(&harvest)
    }

    /// Normalize and commit a harvest produced by an external dispatch run.
    pub fn commit_harvest(&mut self, harvest: &Harvest) -> Result<IngestionReport, TraceError> {
        let mut outcomes = harvest.outcomes.clone();
        let batch = Normalizer::normalize(harvest, &mut outcomes);

        let mut report = IngestionReport::pending(harvest.root.id.clone());
        report.outcomes = outcomes;
        report.status = report.resolve_status();

        let assembled = match &self.backend {
            StoreBackend::InMemory(graph) => Assembler::assemble(graph, &batch, report.clone()),
            StoreBackend::Persistent(store) => Assembler::assemble(store, &batch, report.clone()),
        };

        match assembled {
            Ok(mutation) => {
                self.commit(&mutation)?;
                Ok(report)
            }
            Err(TraceError::StructuralConflict(at)) => {
                // Whole-batch rejection; keep the failure inspectable.
                report.outcomes.push(ExtractorOutcome {
                    artifact: harvest.root.id.clone(),
                    analyzer: "assembler".to_string(),
                    outcome: OutcomeKind::Failure {
                        failure: ExtractionFailure::new(
                            "assembler",
                            FailureKind::Tool,
                            format!("batch rejected: CONTAINS cycle through {}", at.as_str()),
                        ),
                    },
                });
                report.status = crate::IngestStatus::Failed;
                self.commit(&MutationSet::report_only(report))?;
                Err(TraceError::StructuralConflict(at))
            }
            Err(other) => Err(other),
        }
    }

    fn commit(&mut self, mutation: &MutationSet) -> Result<(), TraceError> {
        match &mut self.backend {
            StoreBackend::InMemory(graph) => Assembler::commit(graph, mutation),
            StoreBackend::Persistent(store) => Assembler::commit(store, mutation),
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Trace what an artifact is composed of.
    pub fn trace_composition(
        &self,
        artifact: &ArtifactId,
        options: &TraceOptions,
    ) -> Result<Lineage, TraceError> {
        match &self.backend {
            StoreBackend::InMemory(graph) => query::trace_composition(graph, artifact, options),
            StoreBackend::Persistent(store) => query::trace_composition(store, artifact, options),
        }
    }

    /// Trace which artifacts transitively embed a source location.
    pub fn trace_usage(
        &self,
        source: &SourceLocation,
        options: &TraceOptions,
    ) -> Result<Lineage, TraceError> {
        match &self.backend {
            StoreBackend::InMemory(graph) => query::trace_usage(graph, source, options),
            StoreBackend::Persistent(store) => query::trace_usage(store, source, options),
        }
    }

    /// The stored ingestion report for an artifact.
    pub fn report(&self, artifact: &ArtifactId) -> Result<Option<IngestionReport>, TraceError> {
        match &self.backend {
            StoreBackend::InMemory(graph) => graph.get_report(artifact),
            StoreBackend::Persistent(store) => store.get_report(artifact),
        }
    }

    /// Total node count.
    pub fn node_count(&self) -> Result<usize, TraceError> {
        match &self.backend {
            StoreBackend::InMemory(graph) => graph.node_count(),
            StoreBackend::Persistent(store) => store.node_count(),
        }
    }

    /// Total edge count.
    pub fn edge_count(&self) -> Result<usize, TraceError> {
        match &self.backend {
            StoreBackend::InMemory(graph) => graph.edge_count(),
            StoreBackend::Persistent(store) => store.edge_count(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TraceDepth;
    use crate::{ArtifactFormat, IngestStatus};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn image_content() -> ContentHandle {
        let layer = serde_json::json!({
            "entries": [
                {
                    "name": "usr/bin/app",
                    "format": "binary",
                    "content": BASE64.encode(
                        "mod\texample.com/app\t1.2.0\nrepo\texample.com/app\thttps://github.com/org/app\tdeadbeef\n",
                    ),
                },
            ]
        });
        let manifest = serde_json::json!({
            "layers": [
                {
                    "digest": "sha256:layer0",
                    "format": "archive",
                    "content": BASE64.encode(layer.to_string()),
                },
            ]
        });
        ContentHandle::from_bytes(manifest.to_string().into_bytes())
    }

    fn image_descriptor() -> ArtifactDescriptor {
        ArtifactDescriptor::new(
            ArtifactId::new("registry/app@sha256:abc"),
            ArtifactFormat::LayeredImage,
        )
    }

    #[test]
    fn ingest_builds_the_full_provenance_chain() {
        let mut engine = Engine::new();
        let report = engine
            .ingest(
                &image_descriptor(),
                &image_content(),
                &DispatchLimits::default(),
                &CancelFlag::new(),
            )
            .expect("ingest");

        assert_eq!(report.status, IngestStatus::Complete);

        // image, layer, component, source.
        assert_eq!(engine.node_count().expect("count"), 4);
        // CONTAINS + EMBEDS + BUILT_FROM.
        assert_eq!(engine.edge_count().expect("count"), 3);

        let lineage = engine
            .trace_composition(
                &ArtifactId::new("registry/app@sha256:abc"),
                &TraceOptions::with_depth(TraceDepth::Unbounded),
            )
            .expect("trace");
        assert_eq!(lineage.nodes.len(), 4);
    }

    #[test]
    fn re_ingestion_converges_to_the_same_graph() {
        let mut engine = Engine::new();
        for _ in 0..3 {
            engine
                .ingest(
                    &image_descriptor(),
                    &image_content(),
                    &DispatchLimits::default(),
                    &CancelFlag::new(),
                )
                .expect("ingest");
        }
        assert_eq!(engine.node_count().expect("count"), 4);
        assert_eq!(engine.edge_count().expect("count"), 3);
    }

    #[test]
    fn usage_trace_reaches_the_embedding_image() {
        let mut engine = Engine::new();
        engine
            .ingest(
                &image_descriptor(),
                &image_content(),
                &DispatchLimits::default(),
                &CancelFlag::new(),
            )
            .expect("ingest");

        let source = SourceLocation::normalized("https://github.com/org/app", "deadbeef");
        let lineage = engine
            .trace_usage(&source, &TraceOptions::with_depth(TraceDepth::Unbounded))
            .expect("trace");

        let artifacts: Vec<_> = lineage
            .nodes
            .iter()
            .filter(|n| n.key.kind() == "artifact")
            .collect();
        assert_eq!(artifacts.len(), 2);
    }

    #[test]
    fn cancelled_ingestion_writes_nothing() {
        let mut engine = Engine::new();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = engine
            .ingest(
                &image_descriptor(),
                &image_content(),
                &DispatchLimits::default(),
                &cancel,
            )
            .expect("ingest");

        assert_eq!(report.status, IngestStatus::Failed);
        assert_eq!(engine.node_count().expect("count"), 0);
        assert!(
            engine
                .report(&ArtifactId::new("registry/app@sha256:abc"))
                .expect("report")
                .is_none()
        );
    }

    #[test]
    fn malformed_content_yields_failed_report_with_root_node() {
        let mut engine = Engine::new();
        let descriptor =
            ArtifactDescriptor::new(ArtifactId::new("bad"), ArtifactFormat::Archive);
        let content = ContentHandle::from_bytes(b"not an archive envelope".to_vec());

        let report = engine
            .ingest(&descriptor, &content, &DispatchLimits::default(), &CancelFlag::new())
            .expect("ingest");

        assert_eq!(report.status, IngestStatus::Failed);
        // Root artifact node still exists and the report is stored.
        assert_eq!(engine.node_count().expect("count"), 1);
        let stored = engine
            .report(&ArtifactId::new("bad"))
            .expect("report")
            .expect("present");
        assert_eq!(stored.status, IngestStatus::Failed);
    }

    #[test]
    fn report_is_overwritten_on_re_ingestion() {
        let mut engine = Engine::new();
        let descriptor =
            ArtifactDescriptor::new(ArtifactId::new("a"), ArtifactFormat::Archive);

        let bad = ContentHandle::from_bytes(b"garbage".to_vec());
        engine
            .ingest(&descriptor, &bad, &DispatchLimits::default(), &CancelFlag::new())
            .expect("ingest");
        assert_eq!(
            engine.report(&ArtifactId::new("a")).expect("report").expect("present").status,
            IngestStatus::Failed
        );

        let good = ContentHandle::from_bytes(br#"{"entries": []}"#.to_vec());
        engine
            .ingest(&descriptor, &good, &DispatchLimits::default(), &CancelFlag::new())
            .expect("ingest");
        assert_eq!(
            engine.report(&ArtifactId::new("a")).expect("report").expect("present").status,
            IngestStatus::Complete
        );
    }

    #[test]
    fn persistent_engine_replays_after_reopen() {
        let temp = tempfile::tempdir().expect("temp dir");
        let db_path = temp.path().join("provena.redb");

        {
            let mut engine = Engine::with_redb(&db_path).expect("open");
            engine
                .ingest(
                    &image_descriptor(),
                    &image_content(),
                    &DispatchLimits::default(),
                    &CancelFlag::new(),
                )
                .expect("ingest");
        }

        {
            let engine = Engine::with_redb(&db_path).expect("reopen");
            assert_eq!(engine.node_count().expect("count"), 4);
            let lineage = engine
                .trace_composition(
                    &ArtifactId::new("registry/app@sha256:abc"),
                    &TraceOptions::with_depth(TraceDepth::Unbounded),
                )
                .expect("trace");
            assert_eq!(lineage.nodes.len(), 4);
        }
    }
}
