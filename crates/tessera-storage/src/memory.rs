//! In-memory storage backend for testing

use crate::batch::{fqn_key, CommitSummary, Precondition, WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::traits::{EntityStore, RelationshipGraph, StorageBackend};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tessera_core::{version_tenths, EdgeSelector, Entity, EntityId, EntityKind, Relation};

fn history_key(version: f64) -> i64 {
    version_tenths(version).unwrap_or_else(|| (version * 10.0).round() as i64)
}

/// Inverse of one mutation, replayed newest-first when a batch fails
#[derive(Debug)]
enum Undo {
    Entity { id: EntityId, previous: Option<Entity> },
    FqnIndex { key: String, previous: Option<EntityId> },
    Version { id: EntityId, tenths: i64, previous: Option<Entity> },
    EdgeInserted(u64),
    EdgeRemoved(u64, Relation),
}

#[derive(Debug, Default)]
struct MemoryState {
    entities: HashMap<EntityId, Entity>,
    fqn_index: HashMap<String, EntityId>,
    /// History per entity, keyed by the version's tenths so it sorts numerically
    versions: HashMap<EntityId, BTreeMap<i64, Entity>>,
    /// Edges keyed by insertion sequence, so iteration is insertion order
    edges: BTreeMap<u64, Relation>,
    edge_seq: HashMap<Relation, u64>,
    next_seq: u64,
}

impl MemoryState {
    fn check(&self, precondition: &Precondition) -> StorageResult<()> {
        match precondition {
            Precondition::Version { id, version } => {
                let current = self
                    .entities
                    .get(id)
                    .ok_or_else(|| StorageError::EntityNotFound(id.to_string()))?;
                if current.version != *version {
                    return Err(StorageError::Conflict {
                        id: id.to_string(),
                        expected: *version,
                        actual: current.version,
                    });
                }
            }
            Precondition::NoDependents {
                entity_type,
                selector,
            } => {
                let count = self.edges.values().filter(|e| selector.matches(e)).count();
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

    fn apply(&mut self, op: WriteOp, summary: &mut CommitSummary, undo: &mut Vec<Undo>) -> StorageResult<()> {
        match op {
            WriteOp::PutEntity(entity) => {
                let key = fqn_key(entity.entity_type, &entity.fully_qualified_name);
                if let Some(existing) = self.fqn_index.get(&key) {
                    if *existing != entity.id {
                        return Err(StorageError::DuplicateEntity {
                            entity_type: entity.entity_type.to_string(),
                            fqn: entity.fully_qualified_name.clone(),
                        });
                    }
                }
                let id = entity.id;
                let previous = self.entities.insert(id, entity.to_stored());
                if let Some(old) = &previous {
                    let old_key = fqn_key(old.entity_type, &old.fully_qualified_name);
                    if old_key != key {
                        let previous = self.fqn_index.remove(&old_key);
                        undo.push(Undo::FqnIndex { key: old_key, previous });
                    }
                }
                undo.push(Undo::Entity { id, previous });
                let previous = self.fqn_index.insert(key.clone(), id);
                undo.push(Undo::FqnIndex { key, previous });
            }
            WriteOp::PutVersion(entity) => {
                let id = entity.id;
                let tenths = history_key(entity.version);
                let previous = self.versions.entry(id).or_default().insert(tenths, entity.to_stored());
                undo.push(Undo::Version { id, tenths, previous });
            }
            WriteOp::DeleteEntity { id } => {
                if let Some(entity) = self.entities.remove(&id) {
                    let key = fqn_key(entity.entity_type, &entity.fully_qualified_name);
                    let previous = self.fqn_index.remove(&key);
                    undo.push(Undo::FqnIndex { key, previous });
                    undo.push(Undo::Entity {
                        id,
                        previous: Some(entity),
                    });
                }
            }
            WriteOp::InsertEdge(edge) => {
                if !self.edge_seq.contains_key(&edge) {
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    self.edge_seq.insert(edge.clone(), seq);
                    self.edges.insert(seq, edge);
                    undo.push(Undo::EdgeInserted(seq));
                    summary.edges_inserted += 1;
                }
            }
            WriteOp::DeleteEdge(edge) => {
                if let Some(seq) = self.edge_seq.get(&edge).copied() {
                    summary.edges_deleted += self.remove_edges(vec![seq], undo);
                }
            }
            WriteOp::DeleteEdges(selector) => {
                let doomed = self.edge_seqs(|e| selector.matches(e));
                summary.edges_deleted += self.remove_edges(doomed, undo);
            }
            WriteOp::DeleteAllEdges(id) => {
                let doomed = self.edge_seqs(|e| e.touches(&id));
                summary.edges_deleted += self.remove_edges(doomed, undo);
            }
        }
        Ok(())
    }

    fn edge_seqs(&self, matches: impl Fn(&Relation) -> bool) -> Vec<u64> {
        self.edges
            .iter()
            .filter(|(_, e)| matches(e))
            .map(|(seq, _)| *seq)
            .collect()
    }

    fn remove_edges(&mut self, seqs: Vec<u64>, undo: &mut Vec<Undo>) -> usize {
        let mut removed = 0;
        for seq in seqs {
            if let Some(edge) = self.edges.remove(&seq) {
                self.edge_seq.remove(&edge);
                undo.push(Undo::EdgeRemoved(seq, edge));
                removed += 1;
            }
        }
        removed
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Entity { id, previous } => match previous {
                    Some(entity) => {
                        self.entities.insert(id, entity);
                    }
                    None => {
                        self.entities.remove(&id);
                    }
                },
                Undo::FqnIndex { key, previous } => match previous {
                    Some(id) => {
                        self.fqn_index.insert(key, id);
                    }
                    None => {
                        self.fqn_index.remove(&key);
                    }
                },
                Undo::Version { id, tenths, previous } => {
                    let history = self.versions.entry(id).or_default();
                    match previous {
                        Some(entity) => {
                            history.insert(tenths, entity);
                        }
                        None => {
                            history.remove(&tenths);
                        }
                    }
                    if history.is_empty() {
                        self.versions.remove(&id);
                    }
                }
                Undo::EdgeInserted(seq) => {
                    if let Some(edge) = self.edges.remove(&seq) {
                        self.edge_seq.remove(&edge);
                    }
                }
                Undo::EdgeRemoved(seq, edge) => {
                    self.edge_seq.insert(edge.clone(), seq);
                    self.edges.insert(seq, edge);
                }
            }
        }
    }
}

/// In-memory storage backend
///
/// Useful for testing and temporary storage. A commit mutates the live state
/// under the write lock and records an undo log; a failing op replays the
/// log so the batch leaves no trace.
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> StorageResult<T> {
        let state = self
            .state
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        Ok(f(&state))
    }

    fn commit_sync(&self, batch: WriteBatch) -> StorageResult<CommitSummary> {
        let mut state = self
            .state
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;

        for precondition in &batch.preconditions {
            state.check(precondition)?;
        }

        let mut summary = CommitSummary::default();
        let mut undo = Vec::new();
        for op in batch.ops {
            if let Err(e) = state.apply(op, &mut summary, &mut undo) {
                state.rollback(undo);
                return Err(e);
            }
        }
        Ok(summary)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for MemoryStorage {
    async fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        self.read(|s| s.entities.get(id).cloned())
    }

    async fn get_entity_by_fqn(&self, kind: EntityKind, fqn: &str) -> StorageResult<Option<Entity>> {
        self.read(|s| {
            s.fqn_index
                .get(&fqn_key(kind, fqn))
                .and_then(|id| s.entities.get(id))
                .cloned()
        })
    }

    async fn list_entities(&self, kind: EntityKind) -> StorageResult<Vec<Entity>> {
        self.read(|s| {
            s.entities
                .values()
                .filter(|e| e.entity_type == kind)
                .cloned()
                .collect()
        })
    }

    async fn get_version(&self, id: &EntityId, version: f64) -> StorageResult<Option<Entity>> {
        let Some(tenths) = version_tenths(version) else {
            return Ok(None);
        };
        self.read(|s| s.versions.get(id).and_then(|v| v.get(&tenths)).cloned())
    }

    async fn list_versions(&self, id: &EntityId) -> StorageResult<Vec<Entity>> {
        self.read(|s| {
            s.versions
                .get(id)
                .map(|v| v.values().cloned().collect())
                .unwrap_or_default()
        })
    }
}

#[async_trait]
impl RelationshipGraph for MemoryStorage {
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
        self.read(|s| s.edges.values().filter(|e| selector.matches(e)).cloned().collect())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(true)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<CommitSummary> {
        let summary = self.commit_sync(batch)?;
        tracing::debug!(
            "Committed batch: {} edge(s) inserted, {} deleted",
            summary.edges_inserted,
            summary.edges_deleted
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;

    #[tokio::test]
    async fn test_memory_storage() {
        conformance::run_all(&MemoryStorage::new()).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_concurrent_edge_inserts() {
        conformance::concurrent_edge_inserts(std::sync::Arc::new(MemoryStorage::new())).await;
    }

    #[tokio::test]
    async fn test_failed_batch_restores_entities_and_edge_order() {
        let storage = MemoryStorage::new();
        let dashboard = conformance::entity(EntityKind::Dashboard, "looker.ops", 0.1);
        let charts: Vec<Entity> = (0..3)
            .map(|i| conformance::entity(EntityKind::Chart, &format!("looker.ops_{}", i), 0.1))
            .collect();

        let mut setup = WriteBatch::new().with(WriteOp::PutEntity(dashboard.clone()));
        for chart in &charts {
            setup.push(WriteOp::PutEntity(chart.clone()));
            setup.push(WriteOp::InsertEdge(conformance::contains(&dashboard, chart)));
        }
        setup.push(WriteOp::PutVersion(dashboard.clone()));
        storage.commit(setup).await.unwrap();

        let mut bumped = dashboard.clone();
        bumped.version = 0.2;
        let err = storage
            .commit(
                WriteBatch::new()
                    .with(WriteOp::DeleteAllEdges(dashboard.id))
                    .with(WriteOp::PutVersion(bumped))
                    .with(WriteOp::DeleteEntity { id: dashboard.id })
                    .with(WriteOp::InsertEdge(conformance::contains(&charts[0], &dashboard)))
                    .with(WriteOp::PutEntity(conformance::entity(EntityKind::Chart, "looker.ops_1", 0.1))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateEntity { .. }));

        let stored = storage
            .get_entity_by_fqn(EntityKind::Dashboard, "looker.ops")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, dashboard.id);
        assert_eq!(storage.list_versions(&dashboard.id).await.unwrap().len(), 1);
        assert_eq!(
            storage
                .find_to(&dashboard.id, tessera_core::Relationship::Contains, None)
                .await
                .unwrap(),
            charts.iter().map(|c| c.id).collect::<Vec<_>>()
        );
        assert!(storage
            .find_to(&charts[0].id, tessera_core::Relationship::Contains, None)
            .await
            .unwrap()
            .is_empty());
    }
}
