//! Bounded-depth lineage traversal over LINEAGE edges

use std::collections::{HashMap, HashSet, VecDeque};

use tessera_core::{
    Direction, EdgeSelector, Entity, EntityId, EntityLineage, EntityReference, LineageEdge,
    LineageQuery, LineageStats, Relationship, Result,
};
use tessera_storage::{EntityStore, RelationshipGraph};

/// Breadth-first lineage walker
///
/// Upstream and downstream are walked independently, each with its own
/// visited set, so cycles terminate and a node reachable through several
/// paths is expanded once. Edges whose far endpoint no longer resolves to a
/// stored entity are left out of the result and not walked through.
pub struct LineageEngine<'a, S: EntityStore + RelationshipGraph + ?Sized> {
    storage: &'a S,
}

impl<'a, S: EntityStore + RelationshipGraph + ?Sized> LineageEngine<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// Build the lineage subgraph around `focal`
    pub async fn traverse(&self, focal: &Entity, query: LineageQuery) -> Result<EntityLineage> {
        tracing::debug!(
            "Lineage for {} (upstream={}, downstream={})",
            focal.fully_qualified_name,
            query.upstream_depth,
            query.downstream_depth
        );

        let mut stats = LineageStats::default();
        let mut resolved = HashMap::from([(focal.id, Some(focal.reference()))]);
        let upstream_edges = self
            .walk(focal.id, Direction::Incoming, query.upstream_depth, &mut resolved, &mut stats)
            .await?;
        let downstream_edges = self
            .walk(focal.id, Direction::Outgoing, query.downstream_depth, &mut resolved, &mut stats)
            .await?;

        let mut seen = HashSet::from([focal.id]);
        let mut nodes = Vec::new();
        for edge in upstream_edges.iter().chain(downstream_edges.iter()) {
            for id in [edge.from_entity, edge.to_entity] {
                if seen.insert(id) {
                    if let Some(Some(reference)) = resolved.get(&id) {
                        nodes.push(reference.clone());
                    }
                }
            }
        }

        tracing::debug!(
            "Lineage traversal visited {} nodes over {} edges (depth reached: up {}, down {})",
            stats.nodes_visited,
            stats.edges_traversed,
            stats.max_upstream_depth,
            stats.max_downstream_depth
        );

        Ok(EntityLineage {
            entity: focal.reference(),
            nodes,
            upstream_edges,
            downstream_edges,
        })
    }

    async fn walk(
        &self,
        start: EntityId,
        direction: Direction,
        max_depth: usize,
        resolved: &mut HashMap<EntityId, Option<EntityReference>>,
        stats: &mut LineageStats,
    ) -> Result<Vec<LineageEdge>> {
        let mut edges = Vec::new();
        let mut seen_edges = HashSet::new();
        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([(start, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            stats.nodes_visited += 1;
            if depth >= max_depth {
                continue;
            }

            let selector = EdgeSelector::new(current, Relationship::Lineage, direction);
            for edge in self.storage.find_edges(&selector).await? {
                let (next, _) = edge.peer(direction);
                if !self.resolve(next, resolved).await? {
                    continue;
                }

                stats.edges_traversed += 1;
                let lineage_edge = LineageEdge::new(edge.from_id, edge.to_id);
                if seen_edges.insert(lineage_edge) {
                    edges.push(lineage_edge);
                }

                if visited.insert(next) {
                    let reached = depth + 1;
                    match direction {
                        Direction::Incoming => {
                            stats.max_upstream_depth = stats.max_upstream_depth.max(reached)
                        }
                        Direction::Outgoing => {
                            stats.max_downstream_depth = stats.max_downstream_depth.max(reached)
                        }
                    }
                    queue.push_back((next, reached));
                }
            }
        }

        Ok(edges)
    }

    /// Whether `id` names a stored entity, caching the answer
    async fn resolve(
        &self,
        id: EntityId,
        resolved: &mut HashMap<EntityId, Option<EntityReference>>,
    ) -> Result<bool> {
        if let Some(known) = resolved.get(&id) {
            return Ok(known.is_some());
        }
        let reference = self.storage.get_entity(&id).await?.map(|e| e.reference());
        if reference.is_none() {
            tracing::warn!("Skipping lineage edges to missing entity {}", id);
        }
        let found = reference.is_some();
        resolved.insert(id, reference);
        Ok(found)
    }
}
