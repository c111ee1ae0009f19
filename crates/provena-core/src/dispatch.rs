//! # Analyzer Registry & Dispatcher
//!
//! Maps an artifact's declared format and content signature to the
//! ordered set of applicable extractors, runs them, and collects per-run
//! outcomes. Extractors run independently; a failure in one never
//! prevents the others from running.
//!
//! Chained extraction (an image layer that is itself an archive) is the
//! dispatcher recursively invoking itself on the derived artifact, with
//! the parent CONTAINS child pair recorded before results merge. The
//! recursion is depth-bounded and memoized on content checksum, so
//! identical nested content shared across many parents is extracted once.

use crate::content::ContentHandle;
use crate::extract::Extractor;
use crate::primitives::MAX_NESTING_DEPTH;
use crate::{
    ArtifactDescriptor, ArtifactFormat, ArtifactId, ComponentCandidate, ExtractionFailure,
    ExtractorOutcome, FailureKind, OutcomeKind,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

// =============================================================================
// CANCELLATION & LIMITS
// =============================================================================

/// Cooperative cancellation handle for an in-flight ingestion.
///
/// Cancellation aborts extractors not yet started; a run already in
/// progress finishes naturally. The initiator keeps one clone and the
/// dispatcher polls the other.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Bounds for one dispatch run.
#[derive(Debug, Clone, Copy)]
pub struct DispatchLimits {
    /// Maximum nesting depth for recursive dispatch. Content below the
    /// bound still gets its CONTAINS edge but is not extracted.
    pub max_nesting: usize,
    /// Wall-clock deadline; extractors not started before it are
    /// recorded as timed out.
    pub deadline: Option<Instant>,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            max_nesting: MAX_NESTING_DEPTH,
            deadline: None,
        }
    }
}

impl DispatchLimits {
    /// Default limits with a wall-clock deadline.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Ordered registry of extractors.
///
/// Selection is predicate-driven: each extractor decides applicability
/// from the declared format plus content sniffing, so format dispatch
/// stays out of the dispatcher itself.
#[derive(Default)]
pub struct Registry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("extractors", &self.names())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in extractor set, in dispatch order: structural
    /// extractors first, then the scanning families.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::extract::LayeredImageExtractor));
        registry.register(Box::new(crate::extract::ArchiveExtractor));
        registry.register(Box::new(crate::extract::BinaryBuildInfoExtractor));
        registry.register(Box::new(crate::extract::PackageDescriptorExtractor));
        registry
    }

    /// Append an extractor. Order is dispatch order.
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// Names of the registered extractors, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Select the extractors applicable to one artifact.
    #[must_use]
    pub fn select(
        &self,
        format: ArtifactFormat,
        content: &ContentHandle,
    ) -> Vec<&dyn Extractor> {
        self.extractors
            .iter()
            .map(AsRef::as_ref)
            .filter(|e| e.applies_to(format, content))
            .collect()
    }
}

// =============================================================================
// HARVEST
// =============================================================================

/// One raw component candidate, attributed to the artifact it was found in.
#[derive(Debug, Clone)]
pub struct Finding {
    pub artifact: ArtifactId,
    pub candidate: ComponentCandidate,
}

/// Everything one dispatch run produced: the artifacts visited (root and
/// nested), structural CONTAINS pairs, raw findings, and per-extractor
/// outcomes. Raw input for the normalizer.
#[derive(Debug, Clone)]
pub struct Harvest {
    pub root: ArtifactDescriptor,
    pub artifacts: Vec<ArtifactDescriptor>,
    pub contains: Vec<(ArtifactId, ArtifactId)>,
    pub findings: Vec<Finding>,
    pub outcomes: Vec<ExtractorOutcome>,
}

impl Harvest {
    fn new(root: ArtifactDescriptor) -> Self {
        Self {
            root,
            artifacts: Vec::new(),
            contains: Vec::new(),
            findings: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    /// Whether any extractor run anywhere in the harvest was cancelled.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.outcomes.iter().any(|o| {
            matches!(
                &o.outcome,
                OutcomeKind::Failure { failure } if failure.kind == FailureKind::Cancelled
            )
        })
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

/// Runs the applicable extractors over an artifact and, recursively, over
/// every derived artifact they surface.
pub struct Dispatcher;

impl Dispatcher {
    /// Dispatch extraction for one artifact.
    ///
    /// Never fails as a whole: per-extractor problems become failure
    /// outcomes in the harvest and sibling extractors still run.
    #[must_use]
    pub fn dispatch(
        registry: &Registry,
        descriptor: &ArtifactDescriptor,
        content: &ContentHandle,
        limits: &DispatchLimits,
        cancel: &CancelFlag,
    ) -> Harvest {
        let mut harvest = Harvest::new(descriptor.clone());
        let mut seen_ids = BTreeSet::new();
        // Content checksum -> artifact id already extracted under it.
        let mut memo: BTreeMap<String, ArtifactId> = BTreeMap::new();
        Self::dispatch_inner(
            registry,
            descriptor,
            content,
            limits,
            cancel,
            0,
            &mut memo,
            &mut seen_ids,
            &mut harvest,
        );
        harvest
    }

    fn dispatch_inner(
        registry: &Registry,
        descriptor: &ArtifactDescriptor,
        content: &ContentHandle,
        limits: &DispatchLimits,
        cancel: &CancelFlag,
        depth: usize,
        memo: &mut BTreeMap<String, ArtifactId>,
        seen_ids: &mut BTreeSet<ArtifactId>,
        harvest: &mut Harvest,
    ) {
        memo.insert(content.sha256_hex().to_string(), descriptor.id.clone());
        if seen_ids.insert(descriptor.id.clone()) {
            harvest.artifacts.push(descriptor.clone());
        }

        for extractor in registry.select(descriptor.format, content) {
            // Not-yet-started runs are aborted; a running one would finish.
            if cancel.is_cancelled() {
                harvest.outcomes.push(Self::skipped(
                    descriptor,
                    extractor,
                    FailureKind::Cancelled,
                    "ingestion cancelled before this extractor started",
                ));
                continue;
            }
            if limits.deadline_exceeded() {
                harvest.outcomes.push(Self::skipped(
                    descriptor,
                    extractor,
                    FailureKind::Timeout,
                    "extraction time budget exceeded before this extractor started",
                ));
                continue;
            }

            match extractor.extract(content) {
                Ok(extraction) => {
                    harvest.outcomes.push(ExtractorOutcome {
                        artifact: descriptor.id.clone(),
                        analyzer: extractor.name().to_string(),
                        outcome: OutcomeKind::Success {
                            components: extraction.components.len(),
                            nested: extraction.nested.len(),
                        },
                    });
                    for candidate in extraction.components {
                        harvest.findings.push(Finding {
                            artifact: descriptor.id.clone(),
                            candidate,
                        });
                    }
                    for nested in extraction.nested {
                        Self::descend(
                            registry, descriptor, nested, limits, cancel, depth, memo, seen_ids,
                            harvest,
                        );
                    }
                }
                Err(failure) => {
                    harvest.outcomes.push(ExtractorOutcome {
                        artifact: descriptor.id.clone(),
                        analyzer: extractor.name().to_string(),
                        outcome: OutcomeKind::Failure { failure },
                    });
                }
            }
        }
    }

    fn descend(
        registry: &Registry,
        parent: &ArtifactDescriptor,
        nested: crate::extract::NestedArtifact,
        limits: &DispatchLimits,
        cancel: &CancelFlag,
        depth: usize,
        memo: &mut BTreeMap<String, ArtifactId>,
        seen_ids: &mut BTreeSet<ArtifactId>,
        harvest: &mut Harvest,
    ) {
        // The parent embeds the child structurally either way; extraction
        // of the child may be skipped (memoized or too deep) but the
        // child's identity must exist before the edge can reference it.
        if let Some(known) = memo.get(nested.content.sha256_hex()) {
            harvest
                .contains
                .push((parent.id.clone(), known.clone()));
            return;
        }

        harvest
            .contains
            .push((parent.id.clone(), nested.descriptor.id.clone()));

        if depth + 1 > limits.max_nesting {
            if seen_ids.insert(nested.descriptor.id.clone()) {
                harvest.artifacts.push(nested.descriptor.clone());
            }
            return;
        }

        Self::dispatch_inner(
            registry,
            &nested.descriptor,
            &nested.content,
            limits,
            cancel,
            depth + 1,
            memo,
            seen_ids,
            harvest,
        );
    }

    fn skipped(
        descriptor: &ArtifactDescriptor,
        extractor: &dyn Extractor,
        kind: FailureKind,
        message: &str,
    ) -> ExtractorOutcome {
        ExtractorOutcome {
            artifact: descriptor.id.clone(),
            analyzer: extractor.name().to_string(),
            outcome: OutcomeKind::Failure {
                failure: ExtractionFailure::new(extractor.name(), kind, message),
            },
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Extraction;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    fn image_with_layer(layer: &[u8], digest: &str) -> ContentHandle {
        let manifest = serde_json::json!({
            "layers": [
                {"digest": digest, "format": "archive", "content": BASE64.encode(layer)},
            ]
        });
        ContentHandle::from_bytes(manifest.to_string().into_bytes())
    }

    fn archive_with_binary(records: &str) -> Vec<u8> {
        serde_json::json!({
            "entries": [
                {"name": "bin/app", "format": "binary", "content": BASE64.encode(records)},
            ]
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn recursive_dispatch_collects_nested_results() {
        let layer = archive_with_binary("mod\texample.com/foo\t1.2.0\n");
        let content = image_with_layer(&layer, "sha256:layer0");
        let descriptor = ArtifactDescriptor::new(
            ArtifactId::new("img:sha256:aaa"),
            ArtifactFormat::LayeredImage,
        );

        let harvest = Dispatcher::dispatch(
            &Registry::with_defaults(),
            &descriptor,
            &content,
            &DispatchLimits::default(),
            &CancelFlag::new(),
        );

        assert_eq!(harvest.artifacts.len(), 2);
        assert_eq!(
            harvest.contains,
            vec![(ArtifactId::new("img:sha256:aaa"), ArtifactId::new("sha256:layer0"))]
        );
        // The finding is attributed to the layer, not the image.
        assert_eq!(harvest.findings.len(), 1);
        assert_eq!(harvest.findings[0].artifact.as_str(), "sha256:layer0");
        assert_eq!(harvest.findings[0].candidate.name, "example.com/foo");
        assert!(harvest.outcomes.iter().all(ExtractorOutcome::succeeded));
    }

    #[test]
    fn identical_layers_are_extracted_once() {
        let layer = archive_with_binary("mod\texample.com/foo\t1.2.0\n");
        let manifest = serde_json::json!({
            "layers": [
                {"digest": "sha256:shared", "format": "archive", "content": BASE64.encode(&layer)},
                {"digest": "sha256:shared", "format": "archive", "content": BASE64.encode(&layer)},
            ]
        });
        let content = ContentHandle::from_bytes(manifest.to_string().into_bytes());
        let descriptor =
            ArtifactDescriptor::new(ArtifactId::new("img"), ArtifactFormat::LayeredImage);

        let harvest = Dispatcher::dispatch(
            &Registry::with_defaults(),
            &descriptor,
            &content,
            &DispatchLimits::default(),
            &CancelFlag::new(),
        );

        // Two CONTAINS pairs (same edge), one extraction of the layer.
        assert_eq!(harvest.contains.len(), 2);
        assert_eq!(harvest.findings.len(), 1);
        assert_eq!(harvest.artifacts.len(), 2);
    }

    #[test]
    fn failure_in_one_extractor_never_blocks_siblings() {
        // Valid archive envelope whose binary entry carries a malformed record:
        // the enumerator and package scanner succeed, the binary scanner fails.
        let content =
            ContentHandle::from_bytes(archive_with_binary("mod\tbroken-record\n"));
        let descriptor = ArtifactDescriptor::new(ArtifactId::new("a"), ArtifactFormat::Archive);

        let harvest = Dispatcher::dispatch(
            &Registry::with_defaults(),
            &descriptor,
            &content,
            &DispatchLimits::default(),
            &CancelFlag::new(),
        );

        let failed: Vec<_> = harvest
            .outcomes
            .iter()
            .filter(|o| !o.succeeded())
            .map(|o| o.analyzer.as_str())
            .collect();
        assert_eq!(failed, vec!["binary-buildinfo"]);
        assert_eq!(harvest.outcomes.len(), 3);
    }

    #[test]
    fn cancellation_skips_not_yet_started_extractors() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let content = ContentHandle::from_bytes(archive_with_binary("mod\tx\t1.0\n"));
        let descriptor = ArtifactDescriptor::new(ArtifactId::new("a"), ArtifactFormat::Archive);

        let harvest = Dispatcher::dispatch(
            &Registry::with_defaults(),
            &descriptor,
            &content,
            &DispatchLimits::default(),
            &cancel,
        );

        assert!(harvest.was_cancelled());
        assert!(harvest.findings.is_empty());
        assert!(harvest.outcomes.iter().all(|o| !o.succeeded()));
    }

    #[test]
    fn expired_deadline_records_timeouts() {
        let limits = DispatchLimits::with_deadline(Instant::now() - std::time::Duration::from_millis(1));
        let content = ContentHandle::from_bytes(archive_with_binary("mod\tx\t1.0\n"));
        let descriptor = ArtifactDescriptor::new(ArtifactId::new("a"), ArtifactFormat::Archive);

        let harvest = Dispatcher::dispatch(
            &Registry::with_defaults(),
            &descriptor,
            &content,
            &limits,
            &CancelFlag::new(),
        );

        assert!(harvest.outcomes.iter().all(|o| matches!(
            &o.outcome,
            OutcomeKind::Failure { failure } if failure.kind == FailureKind::Timeout
        )));
    }

    #[test]
    fn nesting_bound_keeps_identity_but_skips_extraction() {
        // archive > archive > archive, bound at 1 level of nesting.
        let innermost = archive_with_binary("mod\tdeep\t1.0\n");
        let middle = serde_json::json!({
            "entries": [
                {"name": "inner", "format": "archive", "content": BASE64.encode(&innermost)},
            ]
        })
        .to_string()
        .into_bytes();
        let outer = serde_json::json!({
            "entries": [
                {"name": "middle", "format": "archive", "content": BASE64.encode(&middle)},
            ]
        });
        let content = ContentHandle::from_bytes(outer.to_string().into_bytes());
        let descriptor = ArtifactDescriptor::new(ArtifactId::new("outer"), ArtifactFormat::Archive);

        let limits = DispatchLimits { max_nesting: 1, ..DispatchLimits::default() };
        let harvest = Dispatcher::dispatch(
            &Registry::with_defaults(),
            &descriptor,
            &content,
            &limits,
            &CancelFlag::new(),
        );

        // outer, middle, innermost all present with CONTAINS chain, but the
        // innermost archive was never opened: no findings from "deep".
        assert_eq!(harvest.artifacts.len(), 3);
        assert_eq!(harvest.contains.len(), 2);
        assert!(harvest.findings.is_empty());
    }

    #[test]
    fn registry_selection_is_predicate_driven() {
        struct Never;
        impl Extractor for Never {
            fn name(&self) -> &'static str {
                "never"
            }
            fn applies_to(&self, _: ArtifactFormat, _: &ContentHandle) -> bool {
                false
            }
            fn extract(&self, _: &ContentHandle) -> Result<Extraction, ExtractionFailure> {
                Ok(Extraction::empty())
            }
        }

        let mut registry = Registry::with_defaults();
        registry.register(Box::new(Never));
        let content = ContentHandle::from_bytes(br#"{"layers": []}"#.to_vec());

        let selected: Vec<_> = registry
            .select(ArtifactFormat::LayeredImage, &content)
            .iter()
            .map(|e| e.name())
            .collect();
        assert_eq!(selected, vec!["layered-image-manifest"]);
    }
}
