//! # redb-backed Provenance Store
//!
//! A disk-backed `ProvStore` using the redb embedded database, giving
//! ACID transactions and crash safety (copy-on-write B-trees) with zero
//! configuration.
//!
//! Node keys are postcard-serialized into the key index table, so the
//! match-or-create contract survives restarts byte-for-byte. The key
//! index is mirrored into memory on open for fast lookups; the mirror is
//! updated only after a transaction commits, so a failed commit leaves
//! both disk and memory untouched.

use crate::graph::ProvStore;
use crate::{
    ArtifactId, IngestionReport, MutationSet, NodeId, NodeKey, RelationKind, TraceError,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::BTreeMap;
use std::path::Path;

/// Table for nodes: NodeId(u64) -> postcard NodeKey bytes.
const NODES: TableDefinition<u64, &[u8]> = TableDefinition::new("nodes");

/// Table for the key index: postcard NodeKey bytes -> NodeId(u64).
const KEY_INDEX: TableDefinition<&[u8], u64> = TableDefinition::new("key_index");

/// Table for edges: (from_id, kind_code, to_id) -> unit.
const EDGES: TableDefinition<(u64, u8, u64), ()> = TableDefinition::new("edges");

/// Reverse edge index: (to_id, kind_code, from_id) -> unit.
const REVERSE_EDGES: TableDefinition<(u64, u8, u64), ()> = TableDefinition::new("reverse_edges");

/// Table for ingestion reports: artifact id -> postcard report bytes.
const REPORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("reports");

/// Table for metadata: key string -> value u64.
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// A disk-backed provenance store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// In-memory mirror of the key index for fast lookups.
    key_cache: BTreeMap<NodeKey, NodeId>,
    /// Next available node id.
    next_node_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("key_cache_size", &self.key_cache.len())
            .field("next_node_id", &self.next_node_id)
            .finish_non_exhaustive()
    }
}

fn io_err(e: impl std::fmt::Display) -> TraceError {
    TraceError::Io(e.to_string())
}

fn ser_err(e: impl std::fmt::Display) -> TraceError {
    TraceError::Serialization(e.to_string())
}

impl RedbStore {
    /// Open or create a provenance database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(io_err)?;
            let _ = write_txn.open_table(NODES).map_err(io_err)?;
            let _ = write_txn.open_table(KEY_INDEX).map_err(io_err)?;
            let _ = write_txn.open_table(EDGES).map_err(io_err)?;
            let _ = write_txn.open_table(REVERSE_EDGES).map_err(io_err)?;
            let _ = write_txn.open_table(REPORTS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            write_txn.commit().map_err(io_err)?;
        }

        let read_txn = db.begin_read().map_err(io_err)?;

        let next_node_id = {
            let table = read_txn.open_table(METADATA).map_err(io_err)?;
            table
                .get("next_node_id")
                .map_err(io_err)?
                .map(|v| v.value())
                .unwrap_or(0)
        };

        let key_cache = {
            let table = read_txn.open_table(KEY_INDEX).map_err(io_err)?;
            let mut cache = BTreeMap::new();
            for entry in table.iter().map_err(io_err)? {
                let (key_bytes, id) = entry.map_err(io_err)?;
                let key: NodeKey = postcard::from_bytes(key_bytes.value()).map_err(ser_err)?;
                cache.insert(key, NodeId(id.value()));
            }
            cache
        };

        Ok(Self {
            db,
            key_cache,
            next_node_id,
        })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), TraceError> {
        self.db.compact().map_err(io_err)?;
        Ok(())
    }

    /// All edges in deterministic key order.
    pub fn edges(&self) -> Result<Vec<(NodeId, RelationKind, NodeId)>, TraceError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(EDGES).map_err(io_err)?;

        let mut edges = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            let (from, code, to) = key.value();
            let kind = RelationKind::from_code(code)
                .ok_or_else(|| TraceError::Serialization(format!("unknown edge code {code}")))?;
            edges.push((NodeId(from), kind, NodeId(to)));
        }
        Ok(edges)
    }

    fn scan_adjacency(
        &self,
        table: TableDefinition<(u64, u8, u64), ()>,
        node: NodeId,
    ) -> Result<Vec<(RelationKind, NodeId)>, TraceError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(table).map_err(io_err)?;

        let mut result = Vec::new();
        for entry in table
            .range((node.0, 0u8, 0u64)..=(node.0, u8::MAX, u64::MAX))
            .map_err(io_err)?
        {
            let (key, _) = entry.map_err(io_err)?;
            let (_, code, other) = key.value();
            let kind = RelationKind::from_code(code)
                .ok_or_else(|| TraceError::Serialization(format!("unknown edge code {code}")))?;
            result.push((kind, NodeId(other)));
        }
        // Adjacency order must match the in-memory backend: kind first.
        result.sort_unstable();
        Ok(result)
    }
}

// =============================================================================
// PROVSTORE TRAIT IMPLEMENTATION
// =============================================================================

impl ProvStore for RedbStore {
    fn upsert_node(&mut self, key: NodeKey) -> Result<NodeId, TraceError> {
        if let Some(&id) = self.key_cache.get(&key) {
            return Ok(id);
        }

        let id = NodeId(self.next_node_id);
        let next = self.next_node_id.saturating_add(1);
        let key_bytes = postcard::to_allocvec(&key).map_err(ser_err)?;

        {
            let write_txn = self.db.begin_write().map_err(io_err)?;
            {
                let mut nodes = write_txn.open_table(NODES).map_err(io_err)?;
                nodes.insert(id.0, key_bytes.as_slice()).map_err(io_err)?;
            }
            {
                let mut index = write_txn.open_table(KEY_INDEX).map_err(io_err)?;
                index.insert(key_bytes.as_slice(), id.0).map_err(io_err)?;
            }
            {
                let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;
                meta.insert("next_node_id", next).map_err(io_err)?;
            }
            write_txn.commit().map_err(io_err)?;
        }

        self.next_node_id = next;
        self.key_cache.insert(key, id);
        Ok(id)
    }

    fn upsert_edge(
        &mut self,
        from: NodeId,
        kind: RelationKind,
        to: NodeId,
    ) -> Result<(), TraceError> {
        if self.lookup(from)?.is_none() || self.lookup(to)?.is_none() {
            return Err(TraceError::NotFound(format!(
                "edge endpoints {} -> {} must exist",
                from.0, to.0
            )));
        }

        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut edges = write_txn.open_table(EDGES).map_err(io_err)?;
            edges.insert((from.0, kind.code(), to.0), ()).map_err(io_err)?;
        }
        {
            let mut reverse = write_txn.open_table(REVERSE_EDGES).map_err(io_err)?;
            reverse
                .insert((to.0, kind.code(), from.0), ())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn node_id(&self, key: &NodeKey) -> Option<NodeId> {
        self.key_cache.get(key).copied()
    }

    fn lookup(&self, id: NodeId) -> Result<Option<NodeKey>, TraceError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;

        match table.get(id.0).map_err(io_err)? {
            Some(data) => {
                let key: NodeKey = postcard::from_bytes(data.value()).map_err(ser_err)?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    fn has_edge(
        &self,
        from: NodeId,
        kind: RelationKind,
        to: NodeId,
    ) -> Result<bool, TraceError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(EDGES).map_err(io_err)?;
        Ok(table
            .get((from.0, kind.code(), to.0))
            .map_err(io_err)?
            .is_some())
    }

    fn outgoing(&self, node: NodeId) -> Result<Vec<(RelationKind, NodeId)>, TraceError> {
        self.scan_adjacency(EDGES, node)
    }

    fn incoming(&self, node: NodeId) -> Result<Vec<(RelationKind, NodeId)>, TraceError> {
        self.scan_adjacency(REVERSE_EDGES, node)
    }

    fn node_count(&self) -> Result<usize, TraceError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(NODES).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    fn edge_count(&self) -> Result<usize, TraceError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(EDGES).map_err(io_err)?;
        Ok(table.len().map_err(io_err)? as usize)
    }

    fn put_report(&mut self, report: &IngestionReport) -> Result<(), TraceError> {
        let bytes = postcard::to_allocvec(report).map_err(ser_err)?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(REPORTS).map_err(io_err)?;
            table
                .insert(report.artifact.as_str(), bytes.as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn get_report(&self, artifact: &ArtifactId) -> Result<Option<IngestionReport>, TraceError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(REPORTS).map_err(io_err)?;

        match table.get(artifact.as_str()).map_err(io_err)? {
            Some(data) => {
                let report: IngestionReport =
                    postcard::from_bytes(data.value()).map_err(ser_err)?;
                Ok(Some(report))
            }
            None => Ok(None),
        }
    }

    /// Apply a whole mutation set in one write transaction.
    ///
    /// Nodes, edges and the report either all land or none do; the key
    /// cache is updated only after the commit succeeds.
    fn apply(&mut self, mutation: &MutationSet) -> Result<(), TraceError> {
        // Pass 0: assign ids for every key the set references, reusing
        // committed ids from the cache and staging new ones.
        let mut batch_ids: BTreeMap<NodeKey, NodeId> = BTreeMap::new();
        let mut resolved: BTreeMap<NodeKey, NodeId> = BTreeMap::new();
        let mut current_next_id = self.next_node_id;

        let referenced = mutation.nodes.iter().chain(
            mutation
                .edges
                .iter()
                .flat_map(|(from, _, to)| [from, to]),
        );
        for key in referenced {
            if resolved.contains_key(key) {
                continue;
            }
            let id = if let Some(&id) = self.key_cache.get(key) {
                id
            } else {
                let id = NodeId(current_next_id);
                current_next_id = current_next_id.saturating_add(1);
                batch_ids.insert(key.clone(), id);
                id
            };
            resolved.insert(key.clone(), id);
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| TraceError::StoreConflict(e.to_string()))?;
        {
            let mut nodes = write_txn.open_table(NODES).map_err(io_err)?;
            let mut index = write_txn.open_table(KEY_INDEX).map_err(io_err)?;
            let mut edges = write_txn.open_table(EDGES).map_err(io_err)?;
            let mut reverse = write_txn.open_table(REVERSE_EDGES).map_err(io_err)?;
            let mut reports = write_txn.open_table(REPORTS).map_err(io_err)?;
            let mut meta = write_txn.open_table(METADATA).map_err(io_err)?;

            for (key, id) in &batch_ids {
                let key_bytes = postcard::to_allocvec(key).map_err(ser_err)?;
                nodes.insert(id.0, key_bytes.as_slice()).map_err(io_err)?;
                index.insert(key_bytes.as_slice(), id.0).map_err(io_err)?;
            }

            for (from, kind, to) in &mutation.edges {
                let from_id = resolved[from];
                let to_id = resolved[to];
                edges
                    .insert((from_id.0, kind.code(), to_id.0), ())
                    .map_err(io_err)?;
                reverse
                    .insert((to_id.0, kind.code(), from_id.0), ())
                    .map_err(io_err)?;
            }

            let report_bytes = postcard::to_allocvec(&mutation.report).map_err(ser_err)?;
            reports
                .insert(mutation.report.artifact.as_str(), report_bytes.as_slice())
                .map_err(io_err)?;

            meta.insert("next_node_id", current_next_id).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        // Update in-memory state only after successful commit.
        self.next_node_id = current_next_id;
        for (key, id) in batch_ids {
            self.key_cache.insert(key, id);
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
