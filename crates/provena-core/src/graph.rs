//! # Provenance Graph Store
//!
//! The `ProvStore` trait and its in-memory implementation.
//!
//! Nodes are keyed by typed identity (`NodeKey`); the store guarantees
//! one node per key by making every insert a lookup-or-insert. Edges are
//! typed by `RelationKind` and indexed in both directions so composition
//! and usage queries cost the same. All structures use `BTreeMap` for
//! deterministic ordering.

use crate::{
    ArtifactId, IngestionReport, MutationSet, NodeId, NodeKey, RelationKind, TraceError,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// PROVSTORE TRAIT
// =============================================================================

/// The core graph operations every backend provides.
///
/// Fallible operations return `Result<T, TraceError>` so that in-memory
/// and persistent backends present the same surface.
pub trait ProvStore {
    /// Insert a node for the given key, returning its id. If the key is
    /// already mapped, returns the existing id without modification.
    fn upsert_node(&mut self, key: NodeKey) -> Result<NodeId, TraceError>;

    /// Insert an edge of the given kind. Re-inserting an existing edge
    /// is a no-op.
    fn upsert_edge(
        &mut self,
        from: NodeId,
        kind: RelationKind,
        to: NodeId,
    ) -> Result<(), TraceError>;

    /// Resolve a key to its node id, if the node exists. Infallible: every
    /// backend keeps the key index in memory.
    fn node_id(&self, key: &NodeKey) -> Option<NodeId>;

    /// Look up the key of a node by id.
    fn lookup(&self, id: NodeId) -> Result<Option<NodeKey>, TraceError>;

    /// Whether the given typed edge exists.
    fn has_edge(&self, from: NodeId, kind: RelationKind, to: NodeId)
    -> Result<bool, TraceError>;

    /// All outgoing edges of a node, in deterministic order.
    fn outgoing(&self, node: NodeId) -> Result<Vec<(RelationKind, NodeId)>, TraceError>;

    /// All incoming edges of a node, in deterministic order.
    fn incoming(&self, node: NodeId) -> Result<Vec<(RelationKind, NodeId)>, TraceError>;

    /// Total node count.
    fn node_count(&self) -> Result<usize, TraceError>;

    /// Total edge count.
    fn edge_count(&self) -> Result<usize, TraceError>;

    /// Store the ingestion report for an artifact, replacing any prior one.
    fn put_report(&mut self, report: &IngestionReport) -> Result<(), TraceError>;

    /// Fetch the stored ingestion report for an artifact.
    fn get_report(&self, artifact: &ArtifactId) -> Result<Option<IngestionReport>, TraceError>;

    /// Apply a validated mutation set.
    ///
    /// The default implementation replays the set through the upsert
    /// methods; backends with transactional storage override it to make
    /// the whole set one commit.
    fn apply(&mut self, mutation: &MutationSet) -> Result<(), TraceError> {
        for key in &mutation.nodes {
            self.upsert_node(key.clone())?;
        }
        for (from, kind, to) in &mutation.edges {
            let from_id = self.upsert_node(from.clone())?;
            let to_id = self.upsert_node(to.clone())?;
            self.upsert_edge(from_id, *kind, to_id)?;
        }
        self.put_report(&mutation.report)
    }
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

/// In-memory graph backend.
///
/// `BTreeMap` exclusively, no `HashMap`, so iteration order and therefore
/// query output are stable across runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    /// Node storage: id -> key.
    nodes: BTreeMap<NodeId, NodeKey>,

    /// Reverse lookup: key -> id.
    key_index: BTreeMap<NodeKey, NodeId>,

    /// Forward adjacency: from -> {(kind, to)}.
    forward: BTreeMap<NodeId, BTreeSet<(RelationKind, NodeId)>>,

    /// Reverse adjacency: to -> {(kind, from)}.
    reverse: BTreeMap<NodeId, BTreeSet<(RelationKind, NodeId)>>,

    /// Latest ingestion report per artifact.
    reports: BTreeMap<ArtifactId, IngestionReport>,

    /// Next available node id.
    next_node_id: u64,
}

impl MemoryGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All node keys in deterministic order.
    pub fn keys(&self) -> impl Iterator<Item = (&NodeId, &NodeKey)> {
        self.nodes.iter()
    }

    /// All edges in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, RelationKind, NodeId)> + '_ {
        self.forward.iter().flat_map(|(from, targets)| {
            targets.iter().map(move |(kind, to)| (*from, *kind, *to))
        })
    }

    /// Restore a node under its original id. Used when replaying
    /// persistent storage into memory.
    pub fn import_node(&mut self, id: NodeId, key: NodeKey) {
        if id.0 >= self.next_node_id {
            self.next_node_id = id.0.saturating_add(1);
        }
        self.key_index.insert(key.clone(), id);
        self.nodes.insert(id, key);
    }

    fn ensure_node(&self, id: NodeId) -> Result<(), TraceError> {
        if self.nodes.contains_key(&id) {
            Ok(())
        } else {
            Err(TraceError::NotFound(format!("node {} does not exist", id.0)))
        }
    }
}

impl ProvStore for MemoryGraph {
    fn upsert_node(&mut self, key: NodeKey) -> Result<NodeId, TraceError> {
        if let Some(&id) = self.key_index.get(&key) {
            return Ok(id);
        }

        let id = NodeId(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);
        self.key_index.insert(key.clone(), id);
        self.nodes.insert(id, key);
        Ok(id)
    }

    fn upsert_edge(
        &mut self,
        from: NodeId,
        kind: RelationKind,
        to: NodeId,
    ) -> Result<(), TraceError> {
        self.ensure_node(from)?;
        self.ensure_node(to)?;
        self.forward.entry(from).or_default().insert((kind, to));
        self.reverse.entry(to).or_default().insert((kind, from));
        Ok(())
    }

    fn node_id(&self, key: &NodeKey) -> Option<NodeId> {
        self.key_index.get(key).copied()
    }

    fn lookup(&self, id: NodeId) -> Result<Option<NodeKey>, TraceError> {
        Ok(self.nodes.get(&id).cloned())
    }

    fn has_edge(
        &self,
        from: NodeId,
        kind: RelationKind,
        to: NodeId,
    ) -> Result<bool, TraceError> {
        Ok(self
            .forward
            .get(&from)
            .is_some_and(|targets| targets.contains(&(kind, to))))
    }

    fn outgoing(&self, node: NodeId) -> Result<Vec<(RelationKind, NodeId)>, TraceError> {
        Ok(self
            .forward
            .get(&node)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default())
    }

    fn incoming(&self, node: NodeId) -> Result<Vec<(RelationKind, NodeId)>, TraceError> {
        Ok(self
            .reverse
            .get(&node)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default())
    }

    fn node_count(&self) -> Result<usize, TraceError> {
        Ok(self.nodes.len())
    }

    fn edge_count(&self) -> Result<usize, TraceError> {
        Ok(self.forward.values().map(BTreeSet::len).sum())
    }

    fn put_report(&mut self, report: &IngestionReport) -> Result<(), TraceError> {
        self.reports.insert(report.artifact.clone(), report.clone());
        Ok(())
    }

    fn get_report(&self, artifact: &ArtifactId) -> Result<Option<IngestionReport>, TraceError> {
        Ok(self.reports.get(artifact).cloned())
    }
}

// =============================================================================
// TESTS
// =============================================================================
