//! # Core Type Definitions
//!
//! This module contains the data model for the Provena composition-tracing
//! engine:
//! - Artifact identity and formats (`ArtifactId`, `ArtifactFormat`)
//! - Component and source identity (`Component`, `SourceLocation`, `NodeKey`)
//! - Raw extractor candidates (`ComponentCandidate`, `SourceHint`)
//! - Ingestion reporting (`IngestionReport`, `ExtractorOutcome`)
//! - Error types (`TraceError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module implement `Ord` where they are used as map
//! keys, so every `BTreeMap`/`BTreeSet` over them iterates in a stable
//! order. Identity keys are normalized before comparison; two extractors
//! that find the same component must converge on one key.

use crate::primitives::{MAX_ARTIFACT_ID_LENGTH, MAX_NAME_LENGTH, MAX_SOURCE_FIELD_LENGTH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// ARTIFACT IDENTITY
// =============================================================================

/// Stable identifier of a built artifact submitted for tracing.
///
/// Supplied by the build connector as content checksum plus build
/// reference (e.g. `img:sha256:aaa`). Re-ingesting the same identifier is
/// idempotent; the artifact node is updated, never duplicated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    /// Create a new artifact identifier.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate the identifier: non-empty and within length limits.
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.0.is_empty() || self.0.len() > MAX_ARTIFACT_ID_LENGTH {
            return Err(TraceError::InvalidDescriptor(format!(
                "artifact id must be 1..={MAX_ARTIFACT_ID_LENGTH} bytes"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared format of an artifact, as reported by the build connector.
///
/// Extractor selection starts from the declared format and is refined by
/// content sniffing; a single artifact may match several extractors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactFormat {
    /// A container image: ordered layers, each an artifact of its own.
    LayeredImage,
    /// An archive envelope enumerating named entries.
    Archive,
    /// A declarative package with explicit metadata fields.
    Package,
    /// A compiled binary with embedded build-info records.
    Binary,
    /// Unrecognized; selection falls back to content sniffing alone.
    #[default]
    Other,
}

impl ArtifactFormat {
    /// Parse a declared format string; unknown values map to `Other`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "layered-image" | "image" | "container" => Self::LayeredImage,
            "archive" => Self::Archive,
            "package" | "rpm" | "maven" => Self::Package,
            "binary" => Self::Binary,
            _ => Self::Other,
        }
    }

    /// Stable lowercase name, used in reports and wire types.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LayeredImage => "layered-image",
            Self::Archive => "archive",
            Self::Package => "package",
            Self::Binary => "binary",
            Self::Other => "other",
        }
    }
}

/// An artifact descriptor as handed over by the build connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Stable artifact identifier.
    pub id: ArtifactId,
    /// Declared format.
    pub format: ArtifactFormat,
}

impl ArtifactDescriptor {
    /// Create a new descriptor.
    #[must_use]
    pub fn new(id: ArtifactId, format: ArtifactFormat) -> Self {
        Self { id, format }
    }
}

/// Ingestion status of an artifact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Ingestion requested, nothing committed yet.
    #[default]
    Pending,
    /// Some extractors failed but usable results were committed.
    Partial,
    /// Every selected extractor succeeded.
    Complete,
    /// The batch was rejected or no usable results were produced.
    Failed,
}

// =============================================================================
// CHECKSUMS
// =============================================================================

/// Hashing algorithm of a content checksum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Unknown,
}

/// A content checksum attached to a component or artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    /// Lowercase hex digest.
    pub digest: String,
}

impl Checksum {
    /// Create a checksum, normalizing the digest to lowercase hex.
    #[must_use]
    pub fn new(algorithm: ChecksumAlgorithm, digest: impl Into<String>) -> Self {
        Self {
            algorithm,
            digest: digest.into().trim().to_ascii_lowercase(),
        }
    }

    /// Guess the algorithm from the digest length.
    #[must_use]
    pub fn guess_algorithm(digest: &str) -> ChecksumAlgorithm {
        match digest.trim().len() {
            32 => ChecksumAlgorithm::Md5,
            40 => ChecksumAlgorithm::Sha1,
            64 => ChecksumAlgorithm::Sha256,
            128 => ChecksumAlgorithm::Sha512,
            _ => ChecksumAlgorithm::Unknown,
        }
    }

    /// Build a checksum guessing the algorithm from the digest length.
    #[must_use]
    pub fn guessed(digest: impl Into<String>) -> Self {
        let digest = digest.into();
        Self::new(Self::guess_algorithm(&digest), digest)
    }
}

// =============================================================================
// COMPONENT IDENTITY
// =============================================================================

/// Version of a component.
///
/// Ambiguity from an extractor is preserved as multiple candidate
/// components (one per version), never collapsed into a guess. `Unknown`
/// loses against any resolved value for the same (ecosystem, name) when a
/// batch is normalized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentVersion {
    /// An explicitly determined version string.
    Resolved(String),
    /// The extractor could not determine a version and did not infer one.
    Unknown,
}

impl ComponentVersion {
    /// Resolved version helper.
    #[must_use]
    pub fn resolved(s: impl Into<String>) -> Self {
        Self::Resolved(s.into())
    }

    /// Whether this version is resolved.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Display form: the version string, or `unknown`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Resolved(v) => v,
            Self::Unknown => "unknown",
        }
    }
}

/// Ecosystem of a component (e.g. `go-module`, `rpm`, `vendored-archive`).
///
/// String-backed to stay open: extractors for new artifact families can
/// mint ecosystems without a core change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Ecosystem(pub String);

impl Ecosystem {
    /// Compiled modules detected from embedded build info.
    pub const GO_MODULE: &'static str = "go-module";
    /// Declarative packages with explicit metadata.
    pub const RPM: &'static str = "rpm";
    /// Source trees vendored into another repository.
    pub const VENDORED_ARCHIVE: &'static str = "vendored-archive";

    /// Create an ecosystem, normalized to lowercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_ascii_lowercase())
    }

    /// Get the ecosystem as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The identity key of a component node.
///
/// Two extractors reporting the same key for any artifact must converge
/// on exactly one graph node. Different versions are different identities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentKey {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub version: ComponentVersion,
    /// Content checksum when one was extractable.
    pub checksum: Option<Checksum>,
}

/// A canonical component: a discrete piece of software identified inside
/// an artifact. The key IS the node; components carry no other state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Component {
    pub key: ComponentKey,
}

impl Component {
    /// Create a component from its identity parts.
    #[must_use]
    pub fn new(
        ecosystem: Ecosystem,
        name: impl Into<String>,
        version: ComponentVersion,
        checksum: Option<Checksum>,
    ) -> Self {
        Self {
            key: ComponentKey {
                ecosystem,
                name: name.into(),
                version,
                checksum,
            },
        }
    }
}

// =============================================================================
// SOURCE LOCATION
// =============================================================================

/// A version-control origin: repository URL plus revision.
///
/// Identity is the normalized pair; distinct components may share one
/// source location. Normalization: trimmed, lowercase URL scheme and
/// host, trailing `/` and `.git` stripped; revision trimmed + lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub repository: String,
    pub revision: String,
}

impl SourceLocation {
    /// Build a source location, applying identity normalization.
    #[must_use]
    pub fn normalized(repository: &str, revision: &str) -> Self {
        Self {
            repository: normalize_repository_url(repository),
            revision: revision.trim().to_ascii_lowercase(),
        }
    }
}

/// Normalize a repository URL for identity comparison.
///
/// Lowercases the scheme and host (the path stays case-sensitive) and
/// strips a trailing slash and `.git` suffix.
#[must_use]
pub fn normalize_repository_url(url: &str) -> String {
    let url = url.trim();
    let mut normalized = match url.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.split_once('/') {
                Some((host, path)) => (host, Some(path)),
                None => (rest, None),
            };
            let mut s = format!(
                "{}://{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase()
            );
            if let Some(path) = path {
                s.push('/');
                s.push_str(path);
            }
            s
        }
        None => url.to_string(),
    };
    while normalized.ends_with('/') {
        normalized.pop();
    }
    if let Some(stripped) = normalized.strip_suffix(".git") {
        normalized = stripped.to_string();
    }
    normalized
}

/// Raw, un-normalized source hint attached to an extractor candidate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceHint {
    pub repository: String,
    pub revision: String,
}

// =============================================================================
// GRAPH VOCABULARY
// =============================================================================

/// Relationship kinds of the provenance graph.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    /// Artifact physically contains this component.
    Embeds,
    /// Component's content originates from this source revision.
    BuiltFrom,
    /// Structural nesting: artifact inside artifact. Must stay acyclic.
    Contains,
}

impl RelationKind {
    /// Stable wire code, used as part of persistent edge keys.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Embeds => 0,
            Self::BuiltFrom => 1,
            Self::Contains => 2,
        }
    }

    /// Decode a wire code.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Embeds),
            1 => Some(Self::BuiltFrom),
            2 => Some(Self::Contains),
            _ => None,
        }
    }
}

/// Unique identifier for a node in the graph store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// The typed identity key of a graph node.
///
/// Nodes are created lazily on first reference and matched by this key
/// thereafter; the store guarantees one node per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKey {
    Artifact(ArtifactId),
    Component(ComponentKey),
    Source(SourceLocation),
}

impl NodeKey {
    /// One-word node kind, used in wire types and reports.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Artifact(_) => "artifact",
            Self::Component(_) => "component",
            Self::Source(_) => "source-location",
        }
    }
}

// =============================================================================
// RAW EXTRACTOR CANDIDATES
// =============================================================================

/// A raw, pre-canonicalization component candidate reported by one
/// extractor run.
///
/// `versions` holds every candidate value when the underlying heuristic
/// is ambiguous; the normalizer fans them out into distinct components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentCandidate {
    pub ecosystem: Ecosystem,
    pub name: String,
    pub versions: Vec<ComponentVersion>,
    pub checksum: Option<Checksum>,
    pub source_hint: Option<SourceHint>,
}

impl ComponentCandidate {
    /// Candidate with a single version.
    #[must_use]
    pub fn new(ecosystem: Ecosystem, name: impl Into<String>, version: ComponentVersion) -> Self {
        Self {
            ecosystem,
            name: name.into(),
            versions: vec![version],
            checksum: None,
            source_hint: None,
        }
    }

    /// Attach a content checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    /// Attach a source-location hint.
    #[must_use]
    pub fn with_source(mut self, repository: impl Into<String>, revision: impl Into<String>) -> Self {
        self.source_hint = Some(SourceHint {
            repository: repository.into(),
            revision: revision.into(),
        });
        self
    }

    /// Validate name and hint lengths.
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LENGTH {
            return Err(TraceError::InvalidDescriptor(format!(
                "component name must be 1..={MAX_NAME_LENGTH} bytes"
            )));
        }
        if self.ecosystem.as_str().is_empty() {
            return Err(TraceError::InvalidDescriptor(
                "component ecosystem must be non-empty".to_string(),
            ));
        }
        if let Some(hint) = &self.source_hint
            && (hint.repository.len() > MAX_SOURCE_FIELD_LENGTH
                || hint.revision.len() > MAX_SOURCE_FIELD_LENGTH)
        {
            return Err(TraceError::InvalidDescriptor(format!(
                "source hint fields must be at most {MAX_SOURCE_FIELD_LENGTH} bytes"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// INGESTION REPORTING
// =============================================================================

/// Why a single extractor run failed. Isolated: recorded in the report,
/// never aborting sibling extractors or the ingestion as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The extractor could not parse its input.
    Parse,
    /// An external analysis tool returned a non-zero exit or malformed output.
    Tool,
    /// The per-invocation time budget was exceeded before the run started.
    Timeout,
    /// Ingestion was cancelled before the run started.
    Cancelled,
}

/// A typed failure record for one extractor run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{analyzer}: {message}")]
pub struct ExtractionFailure {
    /// Name of the extractor that failed.
    pub analyzer: String,
    pub kind: FailureKind,
    pub message: String,
}

impl ExtractionFailure {
    /// Build a failure record.
    #[must_use]
    pub fn new(analyzer: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            analyzer: analyzer.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Outcome of one extractor run over one (possibly nested) artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// The run completed; counts describe what it contributed.
    Success { components: usize, nested: usize },
    /// The run failed; the record says which extractor and why.
    Failure { failure: ExtractionFailure },
}

/// A per-extractor outcome entry in the ingestion report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorOutcome {
    /// The artifact (root or nested) the extractor ran over.
    pub artifact: ArtifactId,
    /// Extractor name.
    pub analyzer: String,
    pub outcome: OutcomeKind,
}

impl ExtractorOutcome {
    /// Whether this outcome is a success.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.outcome, OutcomeKind::Success { .. })
    }

    /// Whether this outcome contributed anything to the graph.
    ///
    /// A success that found no components and no nested artifacts is
    /// vacuous; it keeps an all-success ingestion `Complete` but does
    /// not rescue a failing one into `Partial`.
    #[must_use]
    pub fn contributed(&self) -> bool {
        matches!(
            self.outcome,
            OutcomeKind::Success { components, nested } if components + nested > 0
        )
    }
}

/// The inspectable result of one ingestion.
///
/// Stored per artifact and overwritten (not appended) on re-ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub artifact: ArtifactId,
    pub status: IngestStatus,
    pub outcomes: Vec<ExtractorOutcome>,
}

impl IngestionReport {
    /// Empty pending report for an artifact.
    #[must_use]
    pub fn pending(artifact: ArtifactId) -> Self {
        Self {
            artifact,
            status: IngestStatus::Pending,
            outcomes: Vec::new(),
        }
    }

    /// Number of successful extractor runs.
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Number of failed extractor runs.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.succeeded_count()
    }

    /// Resolve the final status from the recorded outcomes.
    ///
    /// `Complete` when every run succeeded (an empty envelope still
    /// completes), `Partial` when some failed but a sibling contributed
    /// usable results, `Failed` when nothing usable was extracted.
    #[must_use]
    pub fn resolve_status(&self) -> IngestStatus {
        if self.failed_count() == 0 {
            IngestStatus::Complete
        } else if self.outcomes.iter().any(ExtractorOutcome::contributed) {
            IngestStatus::Partial
        } else {
            IngestStatus::Failed
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by the engine.
///
/// Per-extractor and per-candidate issues are absorbed into the
/// ingestion report and never appear here; only structural conflicts,
/// exhausted store retries, and caller mistakes do.
#[derive(Debug, Error)]
pub enum TraceError {
    /// An artifact or source location is absent from the graph.
    #[error("not found: {0}")]
    NotFound(String),

    /// A commit would introduce a CONTAINS cycle; the batch was rejected
    /// and prior graph state is unchanged.
    #[error("structural conflict: CONTAINS cycle through {0}")]
    StructuralConflict(ArtifactId),

    /// A transient write conflict; retried with bounded backoff before
    /// surfacing.
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// A descriptor or candidate failed input validation.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred in the persistent store.
    #[error("I/O error: {0}")]
    Io(String),
}

// =============================================================================
// TESTS
// =============================================================================
