//! # Component Extractors
//!
//! One extractor per artifact representation, behind a shared capability
//! trait. Extractors are pure: given content, they produce candidate
//! components and derived (nested) artifacts. They never write to the
//! graph and never share mutable state with each other.
//!
//! Design policy per family:
//! - version-detection extractors report every candidate version when the
//!   heuristic is ambiguous rather than guessing
//! - metadata-parsing extractors trust explicit fields and otherwise
//!   degrade to "unknown", never inferring
//! - archive/layer extractors produce only structural nesting plus a
//!   content handle for recursive dispatch; they identify no components

mod archive;
mod binary;
mod image;
mod package;

pub use archive::ArchiveExtractor;
pub use binary::BinaryBuildInfoExtractor;
pub use image::LayeredImageExtractor;
pub use package::PackageDescriptorExtractor;

use crate::content::ContentHandle;
use crate::{
    ArtifactDescriptor, ArtifactFormat, ArtifactId, ComponentCandidate, ExtractionFailure,
    FailureKind,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

// =============================================================================
// EXTRACTOR TRAIT
// =============================================================================

/// The shared extraction capability.
///
/// Implementations must be stateless; `extract` is a pure transformation
/// from content to candidates. A failed parse is an `ExtractionFailure`,
/// never a panic: one extractor's failure must not disturb its siblings.
pub trait Extractor: Send + Sync {
    /// Stable extractor name, used in ingestion reports.
    fn name(&self) -> &'static str;

    /// Whether this extractor should run over the given artifact.
    ///
    /// Driven by the declared format plus content sniffing; an artifact
    /// may match more than one extractor.
    fn applies_to(&self, format: ArtifactFormat, content: &ContentHandle) -> bool;

    /// Run the extraction.
    fn extract(&self, content: &ContentHandle) -> Result<Extraction, ExtractionFailure>;
}

/// A derived artifact discovered inside another artifact.
///
/// The dispatcher recursively invokes itself on these and records the
/// parent CONTAINS child relationship.
#[derive(Debug, Clone)]
pub struct NestedArtifact {
    pub descriptor: ArtifactDescriptor,
    pub content: ContentHandle,
}

/// The raw result of one extractor run.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Candidate components found in the artifact itself.
    pub components: Vec<ComponentCandidate>,
    /// Derived artifacts for recursive dispatch.
    pub nested: Vec<NestedArtifact>,
}

impl Extraction {
    /// An empty extraction.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

// =============================================================================
// ARCHIVE ENVELOPE (shared between extractor families)
// =============================================================================

/// One decoded entry of an archive envelope.
///
/// The archive extractor turns structural entries into nested artifacts;
/// the binary and package extractors chain off the same view to scan
/// leaf entries in place, attributing findings to the archive artifact.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub format: ArtifactFormat,
    pub content: ContentHandle,
}

#[derive(Debug, Deserialize)]
struct ArchiveEnvelope {
    entries: Vec<EnvelopeEntry>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeEntry {
    name: String,
    #[serde(default)]
    format: Option<String>,
    /// Base64-encoded entry bytes.
    content: String,
}

/// Parse an archive envelope into decoded entries.
///
/// Returns a `Parse` failure (attributed to `analyzer`) when the envelope
/// or any entry's encoding is malformed.
pub(crate) fn parse_archive_entries(
    analyzer: &'static str,
    content: &ContentHandle,
) -> Result<Vec<ArchiveEntry>, ExtractionFailure> {
    let envelope: ArchiveEnvelope = serde_json::from_slice(content.bytes()).map_err(|e| {
        ExtractionFailure::new(analyzer, FailureKind::Parse, format!("bad archive envelope: {e}"))
    })?;

    let mut entries = Vec::with_capacity(envelope.entries.len());
    for entry in envelope.entries {
        let bytes = BASE64.decode(entry.content.as_bytes()).map_err(|e| {
            ExtractionFailure::new(
                analyzer,
                FailureKind::Parse,
                format!("entry {:?}: bad base64 content: {e}", entry.name),
            )
        })?;
        entries.push(ArchiveEntry {
            name: entry.name,
            format: entry.format.as_deref().map(ArtifactFormat::parse).unwrap_or_default(),
            content: ContentHandle::from_bytes(bytes),
        });
    }
    Ok(entries)
}

/// Derive a stable artifact id for nested content without a declared
/// digest: the content's own sha256.
#[must_use]
pub(crate) fn derived_artifact_id(content: &ContentHandle) -> ArtifactId {
    ArtifactId::new(format!("sha256:{}", content.sha256_hex()))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_envelope_decodes_entries() {
        let envelope = serde_json::json!({
            "entries": [
                {"name": "bin/foo", "format": "binary", "content": BASE64.encode(b"payload")},
                {"name": "doc.txt", "content": BASE64.encode(b"text")},
            ]
        });
        let content = ContentHandle::from_bytes(envelope.to_string().into_bytes());
        let entries = parse_archive_entries("archive-enumerator", &content).expect("parse");

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "bin/foo");
        assert_eq!(entries[0].format, ArtifactFormat::Binary);
        assert_eq!(entries[0].content.bytes(), b"payload");
        // Missing format degrades to Other, nothing is inferred.
        assert_eq!(entries[1].format, ArtifactFormat::Other);
    }

    #[test]
    fn parse_envelope_rejects_bad_base64() {
        let content = ContentHandle::from_bytes(
            br#"{"entries": [{"name": "x", "content": "!!not-base64!!"}]}"#.to_vec(),
        );
        let failure = parse_archive_entries("archive-enumerator", &content)
            .expect_err("must fail");
        assert_eq!(failure.kind, FailureKind::Parse);
        assert!(failure.message.contains("base64"));
    }

    #[test]
    fn derived_ids_are_content_addressed() {
        let a = ContentHandle::from_bytes(b"same".to_vec());
        let b = ContentHandle::from_bytes(b"same".to_vec());
        assert_eq!(derived_artifact_id(&a), derived_artifact_id(&b));
        assert!(derived_artifact_id(&a).as_str().starts_with("sha256:"));
    }
}
