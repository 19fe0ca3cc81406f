//! Lineage graph types

use crate::entity::{EntityId, EntityReference};
use crate::limits::validate_depth;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Upstream and downstream hop limits for a lineage query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageQuery {
    pub upstream_depth: usize,
    pub downstream_depth: usize,
}

impl LineageQuery {
    /// Validate raw depths; negative values are rejected
    pub fn new(upstream_depth: i32, downstream_depth: i32) -> Result<Self> {
        Ok(Self {
            upstream_depth: validate_depth("upstream", upstream_depth)?,
            downstream_depth: validate_depth("downstream", downstream_depth)?,
        })
    }
}

/// A LINEAGE edge: data flows from `from_entity` to `to_entity`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageEdge {
    pub from_entity: EntityId,
    pub to_entity: EntityId,
}

impl LineageEdge {
    pub fn new(from_entity: EntityId, to_entity: EntityId) -> Self {
        Self {
            from_entity,
            to_entity,
        }
    }
}

/// Subgraph around a focal entity
///
/// `nodes` holds every distinct endpoint of the returned edges other than
/// the focal entity itself, which is reported in `entity`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityLineage {
    pub entity: EntityReference,
    pub nodes: Vec<EntityReference>,
    pub upstream_edges: Vec<LineageEdge>,
    pub downstream_edges: Vec<LineageEdge>,
}

impl EntityLineage {
    pub fn node_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }
}

/// Traversal statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineageStats {
    pub nodes_visited: usize,
    pub edges_traversed: usize,
    pub max_upstream_depth: usize,
    pub max_downstream_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_query_rejects_negative_depth() {
        let err = LineageQuery::new(-1, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDepth);
        assert!(err.to_string().contains("upstream"));

        let query = LineageQuery::new(0, 3).unwrap();
        assert_eq!(query.upstream_depth, 0);
        assert_eq!(query.downstream_depth, 3);
    }
}
