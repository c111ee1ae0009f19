//! # Provenance Queries
//!
//! Depth-bounded traversals over the committed graph.
//!
//! Composition tracing walks outward from an artifact along every
//! relationship kind, answering "what is inside this thing". Usage
//! tracing walks the reverse direction from a source location, answering
//! "which artifacts carry code from here". Both return the induced
//! subgraph; shared base layers make unbounded traversal from popular
//! artifacts pathological, so a depth bound is mandatory and unbounded
//! walks require an explicit request.

use crate::graph::ProvStore;
use crate::primitives::{DEFAULT_TRACE_DEPTH, MAX_TRACE_DEPTH};
use crate::{ArtifactId, NodeId, NodeKey, RelationKind, SourceLocation, TraceError};
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

// =============================================================================
// OPTIONS
// =============================================================================

/// Traversal depth: bounded (clamped to the engine maximum) or, on
/// explicit request, unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceDepth {
    Bounded(usize),
    Unbounded,
}

impl Default for TraceDepth {
    fn default() -> Self {
        Self::Bounded(DEFAULT_TRACE_DEPTH)
    }
}

impl TraceDepth {
    /// The effective hop limit.
    #[must_use]
    pub fn limit(self) -> usize {
        match self {
            Self::Bounded(depth) => depth.min(MAX_TRACE_DEPTH),
            Self::Unbounded => usize::MAX,
        }
    }
}

/// Options for one trace query.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceOptions {
    pub depth: TraceDepth,
    /// Wall-clock deadline; exceeding it mid-traversal returns the
    /// partial subgraph with the truncation flag set.
    pub deadline: Option<Instant>,
}

impl TraceOptions {
    /// Default options with the given depth.
    #[must_use]
    pub fn with_depth(depth: TraceDepth) -> Self {
        Self {
            depth,
            ..Self::default()
        }
    }
}

// =============================================================================
// LINEAGE
// =============================================================================

/// One node of a traced subgraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageNode {
    pub id: NodeId,
    pub key: NodeKey,
    /// Hop distance from the traversal start.
    pub depth: usize,
}

/// One edge of a traced subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineageEdge {
    pub from: NodeId,
    pub kind: RelationKind,
    pub to: NodeId,
}

/// The induced subgraph of one trace query.
#[derive(Debug, Clone)]
pub struct Lineage {
    pub root: NodeId,
    pub nodes: Vec<LineageNode>,
    pub edges: Vec<LineageEdge>,
    /// Set when a deadline cut the traversal short.
    pub truncated: bool,
}

// =============================================================================
// QUERIES
// =============================================================================

enum Direction {
    Outgoing,
    Incoming,
}

/// Trace what an artifact is composed of.
///
/// Follows CONTAINS, EMBEDS and BUILT_FROM outward from the artifact up
/// to the depth bound. Fails with `NotFound` if the artifact has never
/// been ingested.
pub fn trace_composition(
    store: &impl ProvStore,
    artifact: &ArtifactId,
    options: &TraceOptions,
) -> Result<Lineage, TraceError> {
    let start = store
        .node_id(&NodeKey::Artifact(artifact.clone()))
        .ok_or_else(|| TraceError::NotFound(format!("artifact {} is not in the graph", artifact.as_str())))?;
    walk(store, start, Direction::Outgoing, options)
}

/// Trace which artifacts transitively carry code from a source location.
///
/// Follows edges in reverse from the source node. Fails with `NotFound`
/// if the location was never linked to any component.
pub fn trace_usage(
    store: &impl ProvStore,
    source: &SourceLocation,
    options: &TraceOptions,
) -> Result<Lineage, TraceError> {
    let start = store
        .node_id(&NodeKey::Source(source.clone()))
        .ok_or_else(|| {
            TraceError::NotFound(format!(
                "source {}@{} is not in the graph",
                source.repository, source.revision
            ))
        })?;
    walk(store, start, Direction::Incoming, options)
}

/// Breadth-first walk collecting the induced subgraph.
///
/// BFS over `BTreeSet` adjacency gives a stable node and edge order for
/// identical graphs, so query output is deterministic.
fn walk(
    store: &impl ProvStore,
    start: NodeId,
    direction: Direction,
    options: &TraceOptions,
) -> Result<Lineage, TraceError> {
    let limit = options.depth.limit();
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut nodes: Vec<LineageNode> = Vec::new();
    let mut edges: Vec<LineageEdge> = Vec::new();
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
    let mut truncated = false;

    visited.insert(start);
    queue.push_back((start, 0));

    while let Some((current, depth)) = queue.pop_front() {
        if options.deadline.is_some_and(|d| Instant::now() >= d) {
            truncated = true;
            break;
        }

        let key = store
            .lookup(current)?
            .ok_or_else(|| TraceError::NotFound(format!("node {} vanished mid-walk", current.0)))?;
        nodes.push(LineageNode { id: current, key, depth });

        if depth >= limit {
            continue;
        }

        let neighbors = match direction {
            Direction::Outgoing => store.outgoing(current)?,
            Direction::Incoming => store.incoming(current)?,
        };
        for (kind, next) in neighbors {
            let edge = match direction {
                Direction::Outgoing => LineageEdge { from: current, kind, to: next },
                Direction::Incoming => LineageEdge { from: next, kind, to: current },
            };
            edges.push(edge);
            if visited.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }

    Ok(Lineage { root: start, nodes, edges, truncated })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraph;
    use crate::{ComponentKey, ComponentVersion, Ecosystem};

    /// img CONTAINS layer, layer EMBEDS component, component BUILT_FROM src.
    fn chain() -> (MemoryGraph, ArtifactId, SourceLocation) {
        let mut graph = MemoryGraph::new();
        let img_id = ArtifactId::new("img");
        let source = SourceLocation::normalized("https://github.com/org/dep", "abc123");

        let img = graph
            .upsert_node(NodeKey::Artifact(img_id.clone()))
            .expect("img");
        let layer = graph
            .upsert_node(NodeKey::Artifact(ArtifactId::new("layer")))
            .expect("layer");
        let component = graph
            .upsert_node(NodeKey::Component(ComponentKey {
                ecosystem: Ecosystem::new(Ecosystem::GO_MODULE),
                name: "example.com/dep".to_string(),
                version: ComponentVersion::resolved("1.0.0"),
                checksum: None,
            }))
            .expect("component");
        let src = graph
            .upsert_node(NodeKey::Source(source.clone()))
            .expect("src");

        graph
            .upsert_edge(img, RelationKind::Contains, layer)
            .expect("edge");
        graph
            .upsert_edge(layer, RelationKind::Embeds, component)
            .expect("edge");
        graph
            .upsert_edge(component, RelationKind::BuiltFrom, src)
            .expect("edge");

        (graph, img_id, source)
    }

    #[test]
    fn composition_includes_transitive_reach_within_depth() {
        let (graph, img, _) = chain();
        let lineage = trace_composition(
            &graph,
            &img,
            &TraceOptions::with_depth(TraceDepth::Bounded(2)),
        )
        .expect("trace");

        let kinds: Vec<&str> = lineage.nodes.iter().map(|n| n.key.kind()).collect();
        // depth 2 reaches the component but not the source behind it.
        assert_eq!(kinds, vec!["artifact", "artifact", "component"]);
        assert!(!lineage.truncated);
    }

    #[test]
    fn depth_one_stops_at_direct_children() {
        let (graph, img, _) = chain();
        let lineage = trace_composition(
            &graph,
            &img,
            &TraceOptions::with_depth(TraceDepth::Bounded(1)),
        )
        .expect("trace");
        assert_eq!(lineage.nodes.len(), 2);
        assert_eq!(lineage.edges.len(), 1);
    }

    #[test]
    fn unbounded_depth_reaches_the_source() {
        let (graph, img, _) = chain();
        let lineage =
            trace_composition(&graph, &img, &TraceOptions::with_depth(TraceDepth::Unbounded))
                .expect("trace");
        assert_eq!(lineage.nodes.len(), 4);
        assert_eq!(lineage.edges.len(), 3);
    }

    #[test]
    fn usage_walks_from_source_back_to_artifacts() {
        let (graph, _, source) = chain();
        let lineage = trace_usage(
            &graph,
            &source,
            &TraceOptions::with_depth(TraceDepth::Unbounded),
        )
        .expect("trace");

        let artifacts: Vec<_> = lineage
            .nodes
            .iter()
            .filter(|n| n.key.kind() == "artifact")
            .collect();
        assert_eq!(artifacts.len(), 2);
        // Edges keep their stored direction even on a reverse walk.
        assert!(
            lineage
                .edges
                .iter()
                .all(|e| e.from != lineage.root || e.kind == RelationKind::BuiltFrom)
        );
    }

    #[test]
    fn missing_start_is_not_found() {
        let (graph, _, _) = chain();
        let err = trace_composition(
            &graph,
            &ArtifactId::new("absent"),
            &TraceOptions::default(),
        )
        .expect_err("missing");
        assert!(matches!(err, TraceError::NotFound(_)));
    }

    #[test]
    fn expired_deadline_truncates() {
        let (graph, img, _) = chain();
        let options = TraceOptions {
            depth: TraceDepth::Unbounded,
            deadline: Some(Instant::now() - std::time::Duration::from_millis(1)),
        };
        let lineage = trace_composition(&graph, &img, &options).expect("trace");
        assert!(lineage.truncated);
        assert!(lineage.nodes.len() < 4);
    }

    #[test]
    fn requested_depth_is_clamped_to_the_maximum() {
        assert_eq!(TraceDepth::Bounded(1_000_000).limit(), MAX_TRACE_DEPTH);
        assert_eq!(TraceDepth::default().limit(), DEFAULT_TRACE_DEPTH);
    }
}
