//! Atomic write batches
//!
//! Every catalog write is expressed as one [`WriteBatch`]: preconditions that
//! are checked inside the backend's transaction, followed by the document,
//! history and edge operations. A backend applies all of it or none of it.

use tessera_core::{EdgeSelector, Entity, EntityId, EntityKind, Relation};

/// Condition checked against the committed state before any op is applied
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The stored document must exist and carry exactly this version
    Version { id: EntityId, version: f64 },
    /// No stored edge may match the selector
    NoDependents {
        entity_type: EntityKind,
        selector: EdgeSelector,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or overwrite the current document and its FQN index entry
    ///
    /// Fails with `DuplicateEntity` when the FQN is indexed to another id.
    PutEntity(Entity),
    /// Append a history record keyed by (id, version)
    PutVersion(Entity),
    /// Remove the current document and its FQN index entry; history is kept
    DeleteEntity { id: EntityId },
    /// Idempotent edge insert
    InsertEdge(Relation),
    DeleteEdge(Relation),
    DeleteEdges(EdgeSelector),
    /// Remove every edge where the entity is either endpoint
    DeleteAllEdges(EntityId),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub preconditions: Vec<Precondition>,
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(mut self, id: EntityId, version: f64) -> Self {
        self.preconditions.push(Precondition::Version { id, version });
        self
    }

    pub fn expect_no_dependents(mut self, entity_type: EntityKind, selector: EdgeSelector) -> Self {
        self.preconditions.push(Precondition::NoDependents {
            entity_type,
            selector,
        });
        self
    }

    /// Require a referenced entity to still be stored at the version that was read
    pub fn pin(&mut self, entity: &Entity) -> &mut Self {
        let precondition = Precondition::Version {
            id: entity.id,
            version: entity.version,
        };
        if !self.preconditions.contains(&precondition) {
            self.preconditions.push(precondition);
        }
        self
    }

    pub fn push(&mut self, op: WriteOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn with(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// What a committed batch changed in the edge store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub edges_inserted: usize,
    pub edges_deleted: usize,
}

/// Version-history key with a fixed-width version so keys sort numerically
pub(crate) fn version_key(id: &EntityId, version: f64) -> String {
    format!("{}|{:012.1}", id, version)
}

pub(crate) fn fqn_key(kind: EntityKind, fqn: &str) -> String {
    format!("{}|{}", kind, fqn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_records_each_entity_once() {
        let team = crate::conformance::entity(EntityKind::Team, "data", 0.3);
        let mut batch = WriteBatch::new().expect_version(team.id, 0.3);
        batch.pin(&team).pin(&team);
        assert_eq!(
            batch.preconditions,
            vec![Precondition::Version {
                id: team.id,
                version: 0.3
            }]
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn test_version_keys_sort_numerically() {
        let id = EntityId::new();
        let mut keys = vec![version_key(&id, 10.0), version_key(&id, 2.1), version_key(&id, 0.1)];
        keys.sort();
        assert_eq!(
            keys,
            vec![version_key(&id, 0.1), version_key(&id, 2.1), version_key(&id, 10.0)]
        );
    }
}
