//! ReDB storage backend
//!
//! Keys are `|`-separated strings so related rows are adjacent and can be
//! found with a prefix range scan:
//!
//! | table       | key                              | value            |
//! |-------------|----------------------------------|------------------|
//! | `entities`  | `id`                             | entity JSON      |
//! | `fqn_index` | `kind|fqn`                       | id               |
//! | `versions`  | `id|version`                     | entity JSON      |
//! | `edges_out` | `from|relation|to_kind|to`       | edge JSON + seq  |
//! | `edges_in`  | `to|relation|from_kind|from`     | edge JSON + seq  |
//! | `meta`      | `schema_version`, `edge_seq`     | u64              |

use crate::batch::{fqn_key, version_key, CommitSummary, Precondition, WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::migration::Migratable;
use crate::traits::{EntityStore, RelationshipGraph, StorageBackend};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tessera_core::{version_tenths, Direction, EdgeSelector, Entity, EntityId, EntityKind, Relation};

// Table definitions
const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");
const FQN_INDEX: TableDefinition<&str, &str> = TableDefinition::new("fqn_index");
const VERSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("versions");
const EDGES_OUT: TableDefinition<&str, &[u8]> = TableDefinition::new("edges_out");
const EDGES_IN: TableDefinition<&str, &[u8]> = TableDefinition::new("edges_in");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SCHEMA_VERSION_KEY: &str = "schema_version";
const EDGE_SEQ_KEY: &str = "edge_seq";

#[derive(Debug, Serialize, Deserialize)]
struct StoredEdge {
    seq: u64,
    edge: Relation,
}

fn out_key(edge: &Relation) -> String {
    format!("{}|{}|{}|{}", edge.from_id, edge.relation, edge.to_type, edge.to_id)
}

fn in_key(edge: &Relation) -> String {
    format!("{}|{}|{}|{}", edge.to_id, edge.relation, edge.from_type, edge.from_id)
}

fn selector_prefix(selector: &EdgeSelector) -> String {
    match selector.peer_type {
        Some(kind) => format!("{}|{}|{}|", selector.entity_id, selector.relation, kind),
        None => format!("{}|{}|", selector.entity_id, selector.relation),
    }
}

/// Collect every (key, value) whose key starts with `prefix`
fn scan_prefix<T>(table: &T, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.range(prefix..)? {
        let (key, value) = entry?;
        if !key.value().starts_with(prefix) {
            break;
        }
        rows.push((key.value().to_string(), value.value().to_vec()));
    }
    Ok(rows)
}

/// Edges under `prefix`, in insertion order
fn scan_edges<T>(table: &T, prefix: &str) -> StorageResult<Vec<Relation>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut stored: Vec<StoredEdge> = scan_prefix(table, prefix)?
        .into_iter()
        .map(|(_, bytes)| serde_json::from_slice(&bytes))
        .collect::<Result<_, _>>()?;
    stored.sort_by_key(|s| s.seq);
    Ok(stored.into_iter().map(|s| s.edge).collect())
}

fn edges_for(txn: &WriteTransaction, selector: &EdgeSelector) -> StorageResult<Vec<Relation>> {
    let table = match selector.direction {
        Direction::Outgoing => txn.open_table(EDGES_OUT)?,
        Direction::Incoming => txn.open_table(EDGES_IN)?,
    };
    scan_edges(&table, &selector_prefix(selector))
}

fn check(txn: &WriteTransaction, precondition: &Precondition) -> StorageResult<()> {
    match precondition {
        Precondition::Version { id, version } => {
            let table = txn.open_table(ENTITIES)?;
            let key = id.to_string();
            let current: Entity = match table.get(key.as_str())? {
                Some(value) => serde_json::from_slice(value.value())?,
                None => return Err(StorageError::EntityNotFound(id.to_string())),
            };
            if current.version != *version {
                return Err(StorageError::Conflict {
                    id: key,
                    expected: *version,
                    actual: current.version,
                });
            }
        }
        Precondition::NoDependents {
            entity_type,
            selector,
        } => {
            let count = edges_for(txn, selector)?.len();
            if count > 0 {
                return Err(StorageError::HasDependents {
                    entity_type: entity_type.to_string(),
                    id: selector.entity_id.to_string(),
                    relation: selector.relation.to_string(),
                    count,
                });
            }
        }
    }
    Ok(())
}

fn insert_edge(txn: &WriteTransaction, edge: Relation) -> StorageResult<bool> {
    let mut out = txn.open_table(EDGES_OUT)?;
    let key = out_key(&edge);
    if out.get(key.as_str())?.is_some() {
        return Ok(false);
    }

    let mut meta = txn.open_table(META)?;
    let seq = meta.get(EDGE_SEQ_KEY)?.map(|v| v.value()).unwrap_or(0) + 1;
    meta.insert(EDGE_SEQ_KEY, seq)?;

    let value = serde_json::to_vec(&StoredEdge { seq, edge: edge.clone() })?;
    out.insert(key.as_str(), value.as_slice())?;
    let mut incoming = txn.open_table(EDGES_IN)?;
    incoming.insert(in_key(&edge).as_str(), value.as_slice())?;
    Ok(true)
}

fn delete_edges(txn: &WriteTransaction, edges: &[Relation]) -> StorageResult<usize> {
    let mut out = txn.open_table(EDGES_OUT)?;
    let mut incoming = txn.open_table(EDGES_IN)?;
    let mut deleted = 0;
    for edge in edges {
        if out.remove(out_key(edge).as_str())?.is_some() {
            deleted += 1;
        }
        incoming.remove(in_key(edge).as_str())?;
    }
    Ok(deleted)
}

fn apply(txn: &WriteTransaction, op: WriteOp, summary: &mut CommitSummary) -> StorageResult<()> {
    match op {
        WriteOp::PutEntity(entity) => {
            let id = entity.id.to_string();
            let index_key = fqn_key(entity.entity_type, &entity.fully_qualified_name);
            let mut index = txn.open_table(FQN_INDEX)?;
            if let Some(existing) = index.get(index_key.as_str())? {
                if existing.value() != id {
                    return Err(StorageError::DuplicateEntity {
                        entity_type: entity.entity_type.to_string(),
                        fqn: entity.fully_qualified_name.clone(),
                    });
                }
            }
            index.insert(index_key.as_str(), id.as_str())?;

            let value = serde_json::to_vec(&entity.to_stored())?;
            let mut table = txn.open_table(ENTITIES)?;
            table.insert(id.as_str(), value.as_slice())?;
        }
        WriteOp::PutVersion(entity) => {
            let value = serde_json::to_vec(&entity.to_stored())?;
            let mut table = txn.open_table(VERSIONS)?;
            table.insert(version_key(&entity.id, entity.version).as_str(), value.as_slice())?;
        }
        WriteOp::DeleteEntity { id } => {
            let mut table = txn.open_table(ENTITIES)?;
            let removed = table
                .remove(id.to_string().as_str())?
                .map(|v| serde_json::from_slice::<Entity>(v.value()))
                .transpose()?;
            if let Some(entity) = removed {
                let mut index = txn.open_table(FQN_INDEX)?;
                index.remove(fqn_key(entity.entity_type, &entity.fully_qualified_name).as_str())?;
            }
        }
        WriteOp::InsertEdge(edge) => {
            if insert_edge(txn, edge)? {
                summary.edges_inserted += 1;
            }
        }
        WriteOp::DeleteEdge(edge) => summary.edges_deleted += delete_edges(txn, &[edge])?,
        WriteOp::DeleteEdges(selector) => {
            let edges = edges_for(txn, &selector)?;
            summary.edges_deleted += delete_edges(txn, &edges)?;
        }
        WriteOp::DeleteAllEdges(id) => {
            let prefix = format!("{}|", id);
            let mut edges = scan_edges(&txn.open_table(EDGES_OUT)?, &prefix)?;
            edges.extend(scan_edges(&txn.open_table(EDGES_IN)?, &prefix)?);
            summary.edges_deleted += delete_edges(txn, &edges)?;
        }
    }
    Ok(())
}

/// ReDB storage backend
pub struct RedbStorage {
    db: Database,
}

impl RedbStorage {
    /// Open or create a ReDB database at the given path, migrating it to the latest schema
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        let storage = Self { db };
        storage.migrate_to_latest()?;
        Ok(storage)
    }

    fn commit_sync(&self, batch: WriteBatch) -> StorageResult<CommitSummary> {
        let txn = self.db.begin_write()?;
        match Self::apply_batch(&txn, batch) {
            Ok(summary) => {
                txn.commit()?;
                Ok(summary)
            }
            Err(e) => {
                txn.abort()?;
                Err(e)
            }
        }
    }

    fn apply_batch(txn: &WriteTransaction, batch: WriteBatch) -> StorageResult<CommitSummary> {
        for precondition in &batch.preconditions {
            check(txn, precondition)?;
        }
        let mut summary = CommitSummary::default();
        for op in batch.ops {
            apply(txn, op, &mut summary)?;
        }
        Ok(summary)
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        table: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StorageResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        match table.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }
}

impl Migratable for RedbStorage {
    fn get_schema_version(&self) -> StorageResult<u32> {
        let write_txn = self.db.begin_write()?;
        let version = write_txn
            .open_table(META)?
            .get(SCHEMA_VERSION_KEY)?
            .map(|v| v.value())
            .unwrap_or(0);
        write_txn.commit()?;
        u32::try_from(version).map_err(|e| StorageError::Migration(e.to_string()))
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META)?;
            meta.insert(SCHEMA_VERSION_KEY, u64::from(version))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn run_migration(&self, version: u32) -> StorageResult<()> {
        match version {
            1 => {
                let write_txn = self.db.begin_write()?;
                {
                    write_txn.open_table(ENTITIES)?;
                    write_txn.open_table(FQN_INDEX)?;
                    write_txn.open_table(VERSIONS)?;
                    write_txn.open_table(EDGES_OUT)?;
                    write_txn.open_table(EDGES_IN)?;
                }
                write_txn.commit()?;
                Ok(())
            }
            other => Err(StorageError::Migration(format!("Unknown schema version {}", other))),
        }
    }
}

#[async_trait]
impl EntityStore for RedbStorage {
    async fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        self.get_json(ENTITIES, &id.to_string())
    }

    async fn get_entity_by_fqn(&self, kind: EntityKind, fqn: &str) -> StorageResult<Option<Entity>> {
        let read_txn = self.db.begin_read()?;
        let id = read_txn
            .open_table(FQN_INDEX)?
            .get(fqn_key(kind, fqn).as_str())?
            .map(|v| v.value().to_string());
        match id {
            Some(id) => self.get_json(ENTITIES, &id),
            None => Ok(None),
        }
    }

    async fn list_entities(&self, kind: EntityKind) -> StorageResult<Vec<Entity>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(FQN_INDEX)?;
        let entities = read_txn.open_table(ENTITIES)?;

        let prefix = format!("{}|", kind);
        let mut result = Vec::new();
        for entry in index.range(prefix.as_str()..)? {
            let (key, id) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            match entities.get(id.value())? {
                Some(value) => result.push(serde_json::from_slice(value.value())?),
                None => {
                    return Err(StorageError::Corrupt {
                        key: key.value().to_string(),
                        reason: format!("indexed id {} has no document", id.value()),
                    })
                }
            }
        }
        Ok(result)
    }

    async fn get_version(&self, id: &EntityId, version: f64) -> StorageResult<Option<Entity>> {
        if version_tenths(version).is_none() {
            return Ok(None);
        }
        self.get_json(VERSIONS, &version_key(id, version))
    }

    async fn list_versions(&self, id: &EntityId) -> StorageResult<Vec<Entity>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(VERSIONS)?;
        scan_prefix(&table, &format!("{}|", id))?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StorageError::from))
            .collect()
    }
}

#[async_trait]
impl RelationshipGraph for RedbStorage {
    async fn insert_edge(&self, edge: &Relation) -> StorageResult<bool> {
        let summary = self.commit_sync(WriteBatch::new().with(WriteOp::InsertEdge(edge.clone())))?;
        Ok(summary.edges_inserted > 0)
    }

    async fn delete_edge(&self, edge: &Relation) -> StorageResult<bool> {
        let summary = self.commit_sync(WriteBatch::new().with(WriteOp::DeleteEdge(edge.clone())))?;
        Ok(summary.edges_deleted > 0)
    }

    async fn delete_all(&self, entity_id: &EntityId) -> StorageResult<usize> {
        let summary = self.commit_sync(WriteBatch::new().with(WriteOp::DeleteAllEdges(*entity_id)))?;
        Ok(summary.edges_deleted)
    }

    async fn delete_by_direction(&self, selector: &EdgeSelector) -> StorageResult<usize> {
        let summary = self.commit_sync(WriteBatch::new().with(WriteOp::DeleteEdges(selector.clone())))?;
        Ok(summary.edges_deleted)
    }

    async fn find_edges(&self, selector: &EdgeSelector) -> StorageResult<Vec<Relation>> {
        let read_txn = self.db.begin_read()?;
        let table = match selector.direction {
            Direction::Outgoing => read_txn.open_table(EDGES_OUT)?,
            Direction::Incoming => read_txn.open_table(EDGES_IN)?,
        };
        scan_edges(&table, &selector_prefix(selector))
    }
}

#[async_trait]
impl StorageBackend for RedbStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        read_txn.open_table(ENTITIES)?;
        Ok(true)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<CommitSummary> {
        let ops = batch.ops.len();
        let summary = self.commit_sync(batch)?;
        tracing::debug!("Committed {} op(s) in single transaction", ops);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use crate::migration::CURRENT_VERSION;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_redb_storage() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        let storage = RedbStorage::open(&db_path).unwrap();
        conformance::run_all(&storage).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_redb_concurrent_edge_inserts() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(&dir.path().join("test.redb")).unwrap();
        conformance::concurrent_edge_inserts(std::sync::Arc::new(storage)).await;
    }

    #[tokio::test]
    async fn test_reopen_keeps_schema_version_and_data() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        let id = {
            let storage = RedbStorage::open(&db_path).unwrap();
            assert_eq!(storage.get_schema_version().unwrap(), CURRENT_VERSION);
            let edge = Relation::new(
                EntityId::new(),
                EntityKind::Table,
                EntityId::new(),
                EntityKind::Table,
                tessera_core::Relationship::Lineage,
            );
            storage.insert_edge(&edge).await.unwrap();
            edge.from_id
        };

        let storage = RedbStorage::open(&db_path).unwrap();
        assert_eq!(storage.get_schema_version().unwrap(), CURRENT_VERSION);
        assert_eq!(
            storage
                .count_to(&id, tessera_core::Relationship::Lineage, None)
                .await
                .unwrap(),
            1
        );
    }
}
