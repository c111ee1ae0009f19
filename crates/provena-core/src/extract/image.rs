//! Layered-image manifest extractor.
//!
//! Parses an image manifest (ordered layer list with digests and embedded
//! layer blobs) and emits one nested artifact per layer for recursive
//! dispatch. Structural only: identifies no components itself.

use super::{Extraction, Extractor, NestedArtifact, derived_artifact_id};
use crate::content::ContentHandle;
use crate::{ArtifactDescriptor, ArtifactFormat, ArtifactId, ExtractionFailure, FailureKind};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;

/// Extracts the layer structure of a container image.
#[derive(Debug, Default)]
pub struct LayeredImageExtractor;

#[derive(Debug, Deserialize)]
struct ImageManifest {
    layers: Vec<LayerEntry>,
}

#[derive(Debug, Deserialize)]
struct LayerEntry {
    /// Content digest of the layer (e.g. `sha256:bbb`). Used verbatim as
    /// the layer's artifact id when present.
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    format: Option<String>,
    /// Base64-encoded layer bytes.
    content: String,
}

impl Extractor for LayeredImageExtractor {
    fn name(&self) -> &'static str {
        "layered-image-manifest"
    }

    fn applies_to(&self, format: ArtifactFormat, content: &ContentHandle) -> bool {
        match format {
            ArtifactFormat::LayeredImage => true,
            ArtifactFormat::Other => content.sniff_json_key("layers"),
            _ => false,
        }
    }

    fn extract(&self, content: &ContentHandle) -> Result<Extraction, ExtractionFailure> {
        let manifest: ImageManifest = serde_json::from_slice(content.bytes()).map_err(|e| {
            ExtractionFailure::new(self.name(), FailureKind::Parse, format!("bad manifest: {e}"))
        })?;

        let mut nested = Vec::with_capacity(manifest.layers.len());
        for (index, layer) in manifest.layers.into_iter().enumerate() {
            let bytes = BASE64.decode(layer.content.as_bytes()).map_err(|e| {
                ExtractionFailure::new(
                    self.name(),
                    FailureKind::Parse,
                    format!("layer {index}: bad base64 content: {e}"),
                )
            })?;
            let layer_content = ContentHandle::from_bytes(bytes);
            let id = match layer.digest {
                Some(digest) if !digest.trim().is_empty() => {
                    ArtifactId::new(digest.trim().to_ascii_lowercase())
                }
                _ => derived_artifact_id(&layer_content),
            };
            // Image layers are filesystem archives unless declared otherwise.
            let format = layer
                .format
                .as_deref()
                .map(ArtifactFormat::parse)
                .unwrap_or(ArtifactFormat::Archive);
            nested.push(NestedArtifact {
                descriptor: ArtifactDescriptor::new(id, format),
                content: layer_content,
            });
        }

        Ok(Extraction { components: Vec::new(), nested })
    }
}

// =============================================================================
// TESTS
// =============================================================================
