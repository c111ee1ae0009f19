//! Archive-content extractor.
//!
//! Enumerates an archive envelope and emits nested artifacts for entries
//! that are themselves structural (archives or images), with a content
//! handle for recursive dispatch. Leaf entries (binaries, descriptors)
//! are left for the scanning extractors, which attribute their findings
//! to this archive artifact; that way a layer full of files stays one
//! artifact node rather than fanning out into hundreds.

use super::{Extraction, Extractor, NestedArtifact, derived_artifact_id, parse_archive_entries};
use crate::content::ContentHandle;
use crate::{ArtifactDescriptor, ArtifactFormat, ExtractionFailure};

/// Extracts the nested structure of an archive.
#[derive(Debug, Default)]
pub struct ArchiveExtractor;

impl Extractor for ArchiveExtractor {
    fn name(&self) -> &'static str {
        "archive-enumerator"
    }

    fn applies_to(&self, format: ArtifactFormat, content: &ContentHandle) -> bool {
        match format {
            ArtifactFormat::Archive => true,
            ArtifactFormat::Other => content.sniff_json_key("entries"),
            _ => false,
        }
    }

    fn extract(&self, content: &ContentHandle) -> Result<Extraction, ExtractionFailure> {
        let entries = parse_archive_entries(self.name(), content)?;

        let nested = entries
            .into_iter()
            .filter(|entry| {
                matches!(
                    entry.format,
                    ArtifactFormat::Archive | ArtifactFormat::LayeredImage
                )
            })
            .map(|entry| NestedArtifact {
                descriptor: ArtifactDescriptor::new(
                    derived_artifact_id(&entry.content),
                    entry.format,
                ),
                content: entry.content,
            })
            .collect();

        Ok(Extraction { components: Vec::new(), nested })
    }
}

// =============================================================================
// TESTS
// =============================================================================
