//! # provena-core
//!
//! The composition-tracing engine for Provena - THE GRAPH.
//!
//! This crate builds and queries a provenance graph answering, for any
//! built artifact, "which source components does this thing actually
//! embed". Artifacts are dissected by format-specific extractors, the raw
//! findings are normalized onto canonical component and source-location
//! identities, and the result is committed atomically as typed EMBEDS,
//! BUILT_FROM and CONTAINS edges.
//!
//! ## Architectural Constraints
//!
//! - Deterministic: `BTreeMap`/`BTreeSet` everywhere, identical inputs
//!   produce identical graphs and query output
//! - Idempotent: re-ingesting an artifact converges instead of duplicating
//! - Pure sync: no async, no network; concurrency belongs to the caller
//! - CONTAINS stays acyclic, enforced before any write

// =============================================================================
// MODULES
// =============================================================================

pub mod assemble;
pub mod content;
pub mod dispatch;
pub mod engine;
pub mod extract;
pub mod graph;
pub mod normalize;
pub mod primitives;
pub mod query;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ArtifactDescriptor, ArtifactFormat, ArtifactId, Checksum, ChecksumAlgorithm, Component,
    ComponentCandidate, ComponentKey, ComponentVersion, Ecosystem, ExtractionFailure,
    ExtractorOutcome, FailureKind, IngestStatus, IngestionReport, NodeId, NodeKey, OutcomeKind,
    RelationKind, SourceHint, SourceLocation, TraceError, normalize_repository_url,
};

// =============================================================================
// RE-EXPORTS: Pipeline
// =============================================================================

pub use assemble::{Assembler, MutationSet};
pub use content::ContentHandle;
pub use dispatch::{CancelFlag, DispatchLimits, Dispatcher, Finding, Harvest, Registry};
pub use engine::{Engine, StoreBackend};
pub use extract::{Extraction, Extractor, NestedArtifact};
pub use graph::{MemoryGraph, ProvStore};
pub use normalize::{CanonicalBatch, Normalizer};
pub use query::{
    Lineage, LineageEdge, LineageNode, TraceDepth, TraceOptions, trace_composition, trace_usage,
};
pub use storage::RedbStore;
