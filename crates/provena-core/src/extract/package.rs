//! Package-descriptor extractor.
//!
//! Parses declarative package metadata (JSON descriptors with explicit
//! `name`/`version`/`source` fields). Explicit fields are trusted;
//! anything absent degrades to "unknown" rather than being inferred.

use super::{Extraction, Extractor, parse_archive_entries};
use crate::content::ContentHandle;
use crate::{
    ArtifactFormat, Checksum, ComponentCandidate, ComponentVersion, Ecosystem, ExtractionFailure,
    FailureKind, SourceHint,
};
use serde::Deserialize;

/// Extracts component identity from declarative package descriptors.
///
/// Also applies to archives, scanning entries declared as packages and
/// attributing findings to the archive artifact itself.
#[derive(Debug, Default)]
pub struct PackageDescriptorExtractor;

#[derive(Debug, Deserialize)]
struct PackageDescriptor {
    name: String,
    #[serde(default)]
    ecosystem: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    checksum: Option<DescriptorChecksum>,
    #[serde(default)]
    source: Option<DescriptorSource>,
}

#[derive(Debug, Deserialize)]
struct DescriptorChecksum {
    digest: String,
}

#[derive(Debug, Deserialize)]
struct DescriptorSource {
    repository: String,
    #[serde(default)]
    revision: Option<String>,
}

impl Extractor for PackageDescriptorExtractor {
    fn name(&self) -> &'static str {
        "package-descriptor"
    }

    fn applies_to(&self, format: ArtifactFormat, content: &ContentHandle) -> bool {
        match format {
            ArtifactFormat::Package | ArtifactFormat::Archive => true,
            ArtifactFormat::Other => {
                content.sniff_json_key("name") && !content.sniff_json_key("layers")
            }
            _ => false,
        }
    }

    fn extract(&self, content: &ContentHandle) -> Result<Extraction, ExtractionFailure> {
        let components = if content.sniff_json_key("entries") {
            // Chained over an archive: parse each package entry in place.
            let entries = parse_archive_entries(self.name(), content)?;
            let mut all = Vec::new();
            for entry in &entries {
                if matches!(entry.format, ArtifactFormat::Package) {
                    all.push(self.parse_descriptor(&entry.content)?);
                }
            }
            all
        } else {
            vec![self.parse_descriptor(content)?]
        };

        Ok(Extraction { components, nested: Vec::new() })
    }
}

impl PackageDescriptorExtractor {
    fn parse_descriptor(
        &self,
        content: &ContentHandle,
    ) -> Result<ComponentCandidate, ExtractionFailure> {
        let descriptor: PackageDescriptor =
            serde_json::from_slice(content.bytes()).map_err(|e| {
                ExtractionFailure::new(
                    self.name(),
                    FailureKind::Parse,
                    format!("bad package descriptor: {e}"),
                )
            })?;

        if descriptor.name.trim().is_empty() {
            return Err(ExtractionFailure::new(
                self.name(),
                FailureKind::Parse,
                "package descriptor has an empty name",
            ));
        }

        // Trust explicit fields; degrade to unknown, never infer.
        let version = match descriptor.version {
            Some(v) if !v.trim().is_empty() => ComponentVersion::resolved(v.trim()),
            _ => ComponentVersion::Unknown,
        };
        let ecosystem = descriptor
            .ecosystem
            .map(Ecosystem::new)
            .unwrap_or_else(|| Ecosystem::new("package"));

        let mut candidate =
            ComponentCandidate::new(ecosystem, descriptor.name.trim(), version);
        if let Some(checksum) = descriptor.checksum {
            candidate.checksum = Some(Checksum::guessed(checksum.digest));
        }
        if let Some(source) = descriptor.source {
            candidate.source_hint = Some(SourceHint {
                repository: source.repository,
                revision: source.revision.unwrap_or_default(),
            });
        }
        Ok(candidate)
    }
}

// =============================================================================
// TESTS
// =============================================================================
