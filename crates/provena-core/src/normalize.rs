//! # Candidate Normalization
//!
//! Turns a raw harvest into one canonical, deterministic batch: validated
//! candidates fanned out per version, equivalent spellings collapsed onto
//! canonical identities, and unknown-version placeholders dropped whenever
//! a resolved sibling exists. The batch is the sole input the assembler
//! commits, so everything here is ordered by `BTreeMap`/`BTreeSet` and the
//! output is a pure function of the harvest.

use crate::dispatch::Harvest;
use crate::{
    ArtifactDescriptor, ArtifactId, Component, ComponentKey, ComponentVersion, Ecosystem,
    ExtractionFailure, FailureKind, OutcomeKind, SourceLocation,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// CANONICAL BATCH
// =============================================================================

/// The normalized form of one ingestion, ready for atomic commit.
///
/// All collections are deduplicated and sorted. Components reference each
/// other only through canonical identity keys, never through positions in
/// the originating harvest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBatch {
    /// Root artifact of the ingestion.
    pub root: ArtifactDescriptor,
    /// Every artifact the batch touches, root included.
    pub artifacts: Vec<ArtifactDescriptor>,
    /// Canonical components embedded somewhere in the batch.
    pub components: BTreeSet<Component>,
    /// Canonical source locations referenced by the batch.
    pub sources: BTreeSet<SourceLocation>,
    /// Artifact EMBEDS component.
    pub embeds: BTreeSet<(ArtifactId, ComponentKey)>,
    /// Component BUILT_FROM source.
    pub built_from: BTreeSet<(ComponentKey, SourceLocation)>,
    /// Artifact CONTAINS artifact.
    pub contains: BTreeSet<(ArtifactId, ArtifactId)>,
}

// =============================================================================
// NORMALIZER
// =============================================================================

/// Stateless normalization pass over a harvest.
pub struct Normalizer;

impl Normalizer {
    /// Normalize a harvest into a canonical batch.
    ///
    /// Candidates that fail validation are converted into parse-failure
    /// outcomes appended to `failures` rather than aborting the batch,
    /// matching the per-extractor isolation of the dispatch phase.
    #[must_use]
    pub fn normalize(harvest: &Harvest, failures: &mut Vec<crate::ExtractorOutcome>) -> CanonicalBatch {
        let mut embeds: BTreeSet<(ArtifactId, ComponentKey)> = BTreeSet::new();
        let mut built_from: BTreeSet<(ComponentKey, SourceLocation)> = BTreeSet::new();
        let mut sources: BTreeSet<SourceLocation> = BTreeSet::new();

        // (ecosystem, name) -> versions seen, to resolve the
        // unknown-vs-resolved merge after the full batch is visible.
        let mut versions_by_identity: BTreeMap<(Ecosystem, String), BTreeSet<ComponentVersion>> =
            BTreeMap::new();

        for finding in &harvest.findings {
            let candidate = &finding.candidate;
            if let Err(err) = candidate.validate() {
                failures.push(crate::ExtractorOutcome {
                    artifact: finding.artifact.clone(),
                    analyzer: "normalizer".to_string(),
                    outcome: OutcomeKind::Failure {
                        failure: ExtractionFailure::new(
                            "normalizer",
                            FailureKind::Parse,
                            err.to_string(),
                        ),
                    },
                });
                continue;
            }

            let identity = (candidate.ecosystem.clone(), candidate.name.clone());
            versions_by_identity
                .entry(identity)
                .or_default()
                .extend(candidate.versions.iter().cloned());

            let source = candidate
                .source_hint
                .as_ref()
                .map(|hint| SourceLocation::normalized(&hint.repository, &hint.revision));
            if let Some(source) = &source {
                sources.insert(source.clone());
            }

            // Ambiguity fans out: one candidate with three versions becomes
            // three component keys, all embedded by the same artifact.
            for version in &candidate.versions {
                let key = ComponentKey {
                    ecosystem: candidate.ecosystem.clone(),
                    name: candidate.name.clone(),
                    version: version.clone(),
                    checksum: candidate.checksum.clone(),
                };
                if let Some(source) = &source {
                    built_from.insert((key.clone(), source.clone()));
                }
                embeds.insert((finding.artifact.clone(), key));
            }
        }

        // An unknown version is a placeholder, not an identity of its own:
        // once any resolved version exists for the same (ecosystem, name),
        // the placeholder and its edges fold away.
        let superseded: BTreeSet<(Ecosystem, String)> = versions_by_identity
            .iter()
            .filter(|(_, versions)| {
                versions.contains(&ComponentVersion::Unknown)
                    && versions.iter().any(ComponentVersion::is_resolved)
            })
            .map(|(identity, _)| identity.clone())
            .collect();

        let folds_away = |key: &ComponentKey| {
            key.version == ComponentVersion::Unknown
                && superseded.contains(&(key.ecosystem.clone(), key.name.clone()))
        };
        embeds.retain(|(_, key)| !folds_away(key));
        built_from.retain(|(key, _)| !folds_away(key));

        let components: BTreeSet<Component> = embeds
            .iter()
            .map(|(_, key)| Component { key: key.clone() })
            .collect();
        // Sources only survive if an edge still references them.
        sources.retain(|s| built_from.iter().any(|(_, src)| src == s));

        let contains: BTreeSet<(ArtifactId, ArtifactId)> =
            harvest.contains.iter().cloned().collect();

        CanonicalBatch {
            root: harvest.root.clone(),
            artifacts: harvest.artifacts.clone(),
            components,
            sources,
            embeds,
            built_from,
            contains,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
