//! # Graph Assembly
//!
//! Turns a canonical batch into a flat mutation set and validates it
//! before any write happens. The one structural invariant enforced here
//! is that CONTAINS stays acyclic: the check runs over the proposed edges
//! unioned with the committed graph, and a violation rejects the whole
//! batch so the store never holds a partial ingestion.

use crate::graph::ProvStore;
use crate::normalize::CanonicalBatch;
use crate::primitives::{STORE_RETRY_BACKOFF_MS, STORE_RETRY_LIMIT};
use crate::{ArtifactId, IngestionReport, NodeKey, RelationKind, TraceError};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// MUTATION SET
// =============================================================================

/// A validated, ready-to-commit set of graph writes.
///
/// Edges reference nodes by key, not id, so the set is backend-neutral;
/// each backend resolves keys through its own lookup-or-insert.
#[derive(Debug, Clone)]
pub struct MutationSet {
    pub nodes: Vec<NodeKey>,
    pub edges: Vec<(NodeKey, RelationKind, NodeKey)>,
    pub report: IngestionReport,
}

impl MutationSet {
    /// A minimal set recording only the root artifact and its report.
    ///
    /// Used when ingestion failed before producing committable structure,
    /// so the failure stays inspectable through the report surface.
    #[must_use]
    pub fn report_only(report: IngestionReport) -> Self {
        Self {
            nodes: vec![NodeKey::Artifact(report.artifact.clone())],
            edges: Vec::new(),
            report,
        }
    }
}

// =============================================================================
// ASSEMBLER
// =============================================================================

/// Validates a canonical batch against the committed graph and flattens
/// it into a mutation set.
pub struct Assembler;

impl Assembler {
    /// Assemble a batch into a mutation set carrying the given report.
    ///
    /// Fails with `StructuralConflict` if any proposed CONTAINS edge would
    /// close a cycle, and with `InvalidDescriptor` if an artifact id in
    /// the batch is out of bounds. No store writes happen on failure.
    pub fn assemble(
        store: &impl ProvStore,
        batch: &CanonicalBatch,
        report: IngestionReport,
    ) -> Result<MutationSet, TraceError> {
        for artifact in &batch.artifacts {
            artifact.id.validate()?;
        }
        Self::check_contains_acyclic(store, batch)?;

        let mut nodes: Vec<NodeKey> = Vec::new();
        nodes.extend(
            batch
                .artifacts
                .iter()
                .map(|a| NodeKey::Artifact(a.id.clone())),
        );
        nodes.extend(
            batch
                .components
                .iter()
                .map(|c| NodeKey::Component(c.key.clone())),
        );
        nodes.extend(batch.sources.iter().cloned().map(NodeKey::Source));

        let mut edges: Vec<(NodeKey, RelationKind, NodeKey)> = Vec::new();
        for (parent, child) in &batch.contains {
            edges.push((
                NodeKey::Artifact(parent.clone()),
                RelationKind::Contains,
                NodeKey::Artifact(child.clone()),
            ));
        }
        for (artifact, component) in &batch.embeds {
            edges.push((
                NodeKey::Artifact(artifact.clone()),
                RelationKind::Embeds,
                NodeKey::Component(component.clone()),
            ));
        }
        for (component, source) in &batch.built_from {
            edges.push((
                NodeKey::Component(component.clone()),
                RelationKind::BuiltFrom,
                NodeKey::Source(source.clone()),
            ));
        }

        Ok(MutationSet { nodes, edges, report })
    }

    /// Commit a mutation set, retrying on transient store conflicts.
    ///
    /// Conflicts other than `StoreConflict` surface immediately. Retries
    /// are bounded and spaced by a linear backoff.
    pub fn commit(store: &mut impl ProvStore, mutation: &MutationSet) -> Result<(), TraceError> {
        let mut attempt = 0;
        loop {
            match store.apply(mutation) {
                Ok(()) => return Ok(()),
                Err(TraceError::StoreConflict(detail)) => {
                    attempt += 1;
                    if attempt > STORE_RETRY_LIMIT {
                        return Err(TraceError::StoreConflict(detail));
                    }
                    std::thread::sleep(std::time::Duration::from_millis(
                        STORE_RETRY_BACKOFF_MS * attempt as u64,
                    ));
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Reject the batch if committed CONTAINS edges plus the proposed ones
    /// admit a cycle.
    fn check_contains_acyclic(
        store: &impl ProvStore,
        batch: &CanonicalBatch,
    ) -> Result<(), TraceError> {
        let mut proposed: BTreeMap<&ArtifactId, BTreeSet<&ArtifactId>> = BTreeMap::new();
        for (parent, child) in &batch.contains {
            if parent == child {
                return Err(TraceError::StructuralConflict(parent.clone()));
            }
            proposed.entry(parent).or_default().insert(child);
        }

        // A cycle in the union must pass through at least one proposed
        // edge, so it suffices to ask, per proposed edge, whether the
        // parent is reachable from the child.
        for (parent, children) in &proposed {
            for child in children {
                if Self::reaches(store, &proposed, child, parent)? {
                    return Err(TraceError::StructuralConflict((*parent).clone()));
                }
            }
        }
        Ok(())
    }

    /// BFS over the union of proposed and committed CONTAINS edges.
    fn reaches(
        store: &impl ProvStore,
        proposed: &BTreeMap<&ArtifactId, BTreeSet<&ArtifactId>>,
        start: &ArtifactId,
        target: &ArtifactId,
    ) -> Result<bool, TraceError> {
        let mut visited: BTreeSet<ArtifactId> = BTreeSet::new();
        let mut queue: VecDeque<ArtifactId> = VecDeque::new();
        queue.push_back(start.clone());
        visited.insert(start.clone());

        while let Some(current) = queue.pop_front() {
            if &current == target {
                return Ok(true);
            }
            for next in Self::contains_successors(store, proposed, &current)? {
                if visited.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
        Ok(false)
    }

    fn contains_successors(
        store: &impl ProvStore,
        proposed: &BTreeMap<&ArtifactId, BTreeSet<&ArtifactId>>,
        id: &ArtifactId,
    ) -> Result<BTreeSet<ArtifactId>, TraceError> {
        let mut successors: BTreeSet<ArtifactId> = proposed
            .get(id)
            .map(|children| children.iter().map(|c| (*c).clone()).collect())
            .unwrap_or_default();

        if let Some(node) = store.node_id(&NodeKey::Artifact(id.clone())) {
            for (kind, to) in store.outgoing(node)? {
                if kind == RelationKind::Contains
                    && let Some(NodeKey::Artifact(child)) = store.lookup(to)?
                {
                    successors.insert(child);
                }
            }
        }
        Ok(successors)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::{ArtifactDescriptor, ArtifactFormat, Component, ComponentVersion, Ecosystem};

    fn descriptor(id: &str) -> ArtifactDescriptor {
        ArtifactDescriptor::new(ArtifactId::new(id), ArtifactFormat::Archive)
    }

    fn batch(root: &str, artifacts: &[&str], contains: &[(&str, &str)]) -> CanonicalBatch {
        CanonicalBatch {
            root: descriptor(root),
            artifacts: artifacts.iter().map(|id| descriptor(id)).collect(),
            components: BTreeSet::new(),
            sources: BTreeSet::new(),
            embeds: BTreeSet::new(),
            built_from: BTreeSet::new(),
            contains: contains
                .iter()
                .map(|(p, c)| (ArtifactId::new(*p), ArtifactId::new(*c)))
                .collect(),
        }
    }

    fn report_for(root: &str) -> IngestionReport {
        IngestionReport::pending(ArtifactId::new(root))
    }

    #[test]
    fn linear_containment_assembles() {
        let store = MemoryGraph::new();
        let batch = batch("a", &["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let mutation =
            Assembler::assemble(&store, &batch, report_for("a")).expect("acyclic batch");
        assert_eq!(mutation.nodes.len(), 3);
        assert_eq!(mutation.edges.len(), 2);
    }

    #[test]
    fn self_containment_is_rejected() {
        let store = MemoryGraph::new();
        let batch = batch("a", &["a"], &[("a", "a")]);
        let err = Assembler::assemble(&store, &batch, report_for("a")).expect_err("cycle");
        assert!(matches!(err, TraceError::StructuralConflict(id) if id.as_str() == "a"));
    }

    #[test]
    fn cycle_within_batch_is_rejected() {
        let store = MemoryGraph::new();
        let batch = batch("a", &["a", "b"], &[("a", "b"), ("b", "a")]);
        assert!(matches!(
            Assembler::assemble(&store, &batch, report_for("a")),
            Err(TraceError::StructuralConflict(_))
        ));
    }

    #[test]
    fn cycle_through_committed_edges_is_rejected() {
        // Commit a CONTAINS b, then propose b CONTAINS a.
        let mut store = MemoryGraph::new();
        let first = batch("a", &["a", "b"], &[("a", "b")]);
        let mutation =
            Assembler::assemble(&store, &first, report_for("a")).expect("first batch");
        Assembler::commit(&mut store, &mutation).expect("commit");

        let second = batch("b", &["a", "b"], &[("b", "a")]);
        assert!(matches!(
            Assembler::assemble(&store, &second, report_for("b")),
            Err(TraceError::StructuralConflict(_))
        ));
    }

    #[test]
    fn diamond_containment_is_not_a_cycle() {
        let store = MemoryGraph::new();
        let batch = batch(
            "a",
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        assert!(Assembler::assemble(&store, &batch, report_for("a")).is_ok());
    }

    #[test]
    fn rejected_batch_leaves_store_untouched() {
        let store = MemoryGraph::new();
        let bad = batch("a", &["a", "b"], &[("a", "b"), ("b", "a")]);
        let _ = Assembler::assemble(&store, &bad, report_for("a"));
        assert_eq!(store.node_count().expect("count"), 0);
        assert_eq!(store.edge_count().expect("count"), 0);
    }

    #[test]
    fn commit_replays_nodes_edges_and_report() {
        let mut store = MemoryGraph::new();
        let mut b = batch("a", &["a", "b"], &[("a", "b")]);
        b.components.insert(Component::new(
            Ecosystem::new(Ecosystem::GO_MODULE),
            "example.com/dep",
            ComponentVersion::resolved("1.0.0"),
            None,
        ));
        b.embeds.insert((
            ArtifactId::new("b"),
            Component::new(
                Ecosystem::new(Ecosystem::GO_MODULE),
                "example.com/dep",
                ComponentVersion::resolved("1.0.0"),
                None,
            )
            .key,
        ));

        let mutation = Assembler::assemble(&store, &b, report_for("a")).expect("assemble");
        Assembler::commit(&mut store, &mutation).expect("commit");

        assert_eq!(store.node_count().expect("count"), 3);
        assert_eq!(store.edge_count().expect("count"), 2);
        assert!(
            store
                .get_report(&ArtifactId::new("a"))
                .expect("get")
                .is_some()
        );
    }

    #[test]
    fn report_only_mutation_records_the_root() {
        let mut store = MemoryGraph::new();
        let mutation = MutationSet::report_only(report_for("broken"));
        Assembler::commit(&mut store, &mutation).expect("commit");
        assert!(store.node_id(&NodeKey::Artifact(ArtifactId::new("broken"))).is_some());
        assert_eq!(store.edge_count().expect("count"), 0);
    }
}
