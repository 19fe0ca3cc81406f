//! Storage backend trait definitions

use crate::batch::{CommitSummary, WriteBatch};
use crate::error::StorageResult;
use async_trait::async_trait;
use tessera_core::{Direction, EdgeSelector, Entity, EntityId, EntityKind, Relation, Relationship};

/// Current documents, indexed by id and by (kind, FQN), plus version history
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Get the current document by id
    async fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>>;

    /// Get the current document by fully-qualified name
    async fn get_entity_by_fqn(&self, kind: EntityKind, fqn: &str) -> StorageResult<Option<Entity>>;

    /// All current documents of one kind, in no particular order
    async fn list_entities(&self, kind: EntityKind) -> StorageResult<Vec<Entity>>;

    /// One history record
    async fn get_version(&self, id: &EntityId, version: f64) -> StorageResult<Option<Entity>>;

    /// Every history record of an entity, oldest first
    async fn list_versions(&self, id: &EntityId) -> StorageResult<Vec<Entity>>;
}

/// Directed, typed edges between arbitrary entities
///
/// The graph does not check that either endpoint exists. Lookups for an
/// unknown id return an empty result.
#[async_trait]
pub trait RelationshipGraph: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Writes (each one is its own transaction)
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an edge; returns false if the same 5-tuple is already stored
    async fn insert_edge(&self, edge: &Relation) -> StorageResult<bool>;

    /// Delete one edge; returns false if it was not stored
    async fn delete_edge(&self, edge: &Relation) -> StorageResult<bool>;

    /// Delete every edge touching `entity_id`
    async fn delete_all(&self, entity_id: &EntityId) -> StorageResult<usize>;

    /// Delete the edges of one relation/direction/peer-type triple
    async fn delete_by_direction(&self, selector: &EdgeSelector) -> StorageResult<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Edges matching the selector, in insertion order
    async fn find_edges(&self, selector: &EdgeSelector) -> StorageResult<Vec<Relation>>;

    /// Peers reached by outgoing edges of `from_id`
    async fn find_to(
        &self,
        from_id: &EntityId,
        relation: Relationship,
        peer_type: Option<EntityKind>,
    ) -> StorageResult<Vec<EntityId>> {
        let selector = edge_selector(from_id, relation, Direction::Outgoing, peer_type);
        let edges = self.find_edges(&selector).await?;
        Ok(edges.into_iter().map(|e| e.to_id).collect())
    }

    /// Peers reached by incoming edges of `to_id`
    async fn find_from(
        &self,
        to_id: &EntityId,
        relation: Relationship,
        peer_type: Option<EntityKind>,
    ) -> StorageResult<Vec<EntityId>> {
        let selector = edge_selector(to_id, relation, Direction::Incoming, peer_type);
        let edges = self.find_edges(&selector).await?;
        Ok(edges.into_iter().map(|e| e.from_id).collect())
    }

    /// Number of outgoing edges of `id`
    async fn count_to(
        &self,
        id: &EntityId,
        relation: Relationship,
        peer_type: Option<EntityKind>,
    ) -> StorageResult<usize> {
        let selector = edge_selector(id, relation, Direction::Outgoing, peer_type);
        Ok(self.find_edges(&selector).await?.len())
    }

    /// Number of incoming edges of `id`
    async fn count_from(
        &self,
        id: &EntityId,
        relation: Relationship,
        peer_type: Option<EntityKind>,
    ) -> StorageResult<usize> {
        let selector = edge_selector(id, relation, Direction::Incoming, peer_type);
        Ok(self.find_edges(&selector).await?.len())
    }
}

fn edge_selector(
    id: &EntityId,
    relation: Relationship,
    direction: Direction,
    peer_type: Option<EntityKind>,
) -> EdgeSelector {
    EdgeSelector {
        entity_id: *id,
        relation,
        direction,
        peer_type,
    }
}

/// Trait for storage backend implementations
#[async_trait]
pub trait StorageBackend: EntityStore + RelationshipGraph {
    /// Initialize the storage (create tables, run migrations)
    async fn initialize(&self) -> StorageResult<()>;

    /// Close the storage connection
    async fn close(&self) -> StorageResult<()>;

    /// Health check
    async fn health_check(&self) -> StorageResult<bool>;

    /// Apply a batch atomically after checking its preconditions
    async fn commit(&self, batch: WriteBatch) -> StorageResult<CommitSummary>;
}
