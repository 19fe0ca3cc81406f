//! Relation (edge) types and operations

use crate::entity::EntityId;
use crate::kind::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a directed edge between two entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    /// Container to child (service to database, pipeline to task, team to user)
    Contains,
    /// Owner (user or team) to owned entity
    Owns,
    /// User to followed entity
    Follows,
    /// Upstream entity to downstream entity
    Lineage,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::Owns => "owns",
            Self::Follows => "follows",
            Self::Lineage => "lineage",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relationship {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "contains" => Ok(Self::Contains),
            "owns" => Ok(Self::Owns),
            "follows" => Ok(Self::Follows),
            "lineage" => Ok(Self::Lineage),
            other => Err(crate::Error::Validation(format!("Unknown relationship: {}", other))),
        }
    }
}

/// Which endpoint of an edge a query is anchored on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The entity is the `from` side
    Outgoing,
    /// The entity is the `to` side
    Incoming,
}

/// A directed, typed edge between two entities
///
/// The full 5-tuple is the edge identity: inserting it twice stores it once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub from_id: EntityId,
    pub from_type: EntityKind,
    pub to_id: EntityId,
    pub to_type: EntityKind,
    pub relation: Relationship,
}

impl Relation {
    pub fn new(
        from_id: EntityId,
        from_type: EntityKind,
        to_id: EntityId,
        to_type: EntityKind,
        relation: Relationship,
    ) -> Self {
        Self {
            from_id,
            from_type,
            to_id,
            to_type,
            relation,
        }
    }

    /// Whether `id` is either endpoint
    pub fn touches(&self, id: &EntityId) -> bool {
        self.from_id == *id || self.to_id == *id
    }

    /// Endpoint on the far side from an entity anchored in `direction`
    pub fn peer(&self, direction: Direction) -> (EntityId, EntityKind) {
        match direction {
            Direction::Outgoing => (self.to_id, self.to_type),
            Direction::Incoming => (self.from_id, self.from_type),
        }
    }

    /// Whether this edge matches a (entity, relation, direction, peer type) selector
    pub fn matches(
        &self,
        entity_id: &EntityId,
        relation: Relationship,
        direction: Direction,
        peer_type: Option<EntityKind>,
    ) -> bool {
        if self.relation != relation {
            return false;
        }
        let (anchor, (_, peer_kind)) = match direction {
            Direction::Outgoing => (self.from_id, self.peer(direction)),
            Direction::Incoming => (self.to_id, self.peer(direction)),
        };
        anchor == *entity_id && peer_type.map_or(true, |k| k == peer_kind)
    }
}

/// Selector for edges of one relation/direction/peer-type triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSelector {
    pub entity_id: EntityId,
    pub relation: Relationship,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_type: Option<EntityKind>,
}

impl EdgeSelector {
    pub fn new(entity_id: EntityId, relation: Relationship, direction: Direction) -> Self {
        Self {
            entity_id,
            relation,
            direction,
            peer_type: None,
        }
    }

    pub fn with_peer_type(mut self, peer_type: EntityKind) -> Self {
        self.peer_type = Some(peer_type);
        self
    }

    pub fn matches(&self, edge: &Relation) -> bool {
        edge.matches(&self.entity_id, self.relation, self.direction, self.peer_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_creation() {
        let pipeline = EntityId::new();
        let task = EntityId::new();

        let relation = Relation::new(
            pipeline,
            EntityKind::Pipeline,
            task,
            EntityKind::Task,
            Relationship::Contains,
        );

        assert!(relation.touches(&pipeline));
        assert!(relation.touches(&task));
        assert_eq!(relation.peer(Direction::Outgoing), (task, EntityKind::Task));
        assert_eq!(
            relation.peer(Direction::Incoming),
            (pipeline, EntityKind::Pipeline)
        );
    }

    #[test]
    fn test_selector_matching() {
        let team = EntityId::new();
        let user = EntityId::new();
        let edge = Relation::new(team, EntityKind::Team, user, EntityKind::User, Relationship::Contains);

        let users = EdgeSelector::new(team, Relationship::Contains, Direction::Outgoing)
            .with_peer_type(EntityKind::User);
        assert!(users.matches(&edge));

        let tables = users.clone().with_peer_type(EntityKind::Table);
        assert!(!tables.matches(&edge));

        let incoming = EdgeSelector::new(team, Relationship::Contains, Direction::Incoming);
        assert!(!incoming.matches(&edge));

        let owns = EdgeSelector::new(team, Relationship::Owns, Direction::Outgoing);
        assert!(!owns.matches(&edge));
    }
}
