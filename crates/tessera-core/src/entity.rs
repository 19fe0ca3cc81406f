//! Entity (node) types and operations

use crate::error::{Error, Result};
use crate::kind::EntityKind;
use crate::version::ChangeDescription;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s).map_err(|e| Error::Validation(format!("Invalid entity id {}: {}", s, e)))
    }
}

/// Weak pointer to any stored entity, resolved by (id, type) at read time
///
/// Callers only need to supply `id` and `entity_type` when passing a
/// reference in; the remaining fields are filled in when the catalog
/// resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityReference {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: EntityKind,
    /// Fully-qualified name of the target
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EntityReference {
    pub fn new(id: EntityId, entity_type: EntityKind) -> Self {
        Self {
            id,
            entity_type,
            name: String::new(),
            display_name: None,
            description: None,
        }
    }
}

/// A versioned catalog document
///
/// Relationship-derived fields (`owner`, `container`, `followers`,
/// `children`, `owns`, `teams`, `follows`) are never persisted inside the document; they are
/// rebuilt from the relationship graph on every read and are `None` unless
/// requested. Type-specific fields live in `attributes` and are flattened
/// into the top level of the JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    pub entity_type: EntityKind,

    /// Local name, unique within the container
    pub name: String,

    /// Immutable hierarchical name minted from the container FQN
    pub fully_qualified_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub version: f64,

    pub updated_by: String,

    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_description: Option<ChangeDescription>,

    #[serde(default)]
    pub deleted: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityReference>,

    /// Parent service/namespace the FQN is derived from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<EntityReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub followers: Option<Vec<EntityReference>>,

    /// Entities this one CONTAINS; exposed under the kind's child field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<EntityReference>>,

    /// Entities owned by this user or team
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owns: Option<Vec<EntityReference>>,

    /// Teams whose membership CONTAINS this user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teams: Option<Vec<EntityReference>>,

    /// Entities this user follows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follows: Option<Vec<EntityReference>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,

    #[serde(flatten, default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    /// Reference to this entity, keyed by its FQN
    pub fn reference(&self) -> EntityReference {
        EntityReference {
            id: self.id,
            entity_type: self.entity_type,
            name: self.fully_qualified_name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
        }
    }

    /// Copy of the document without relationship-derived fields
    pub fn to_stored(&self) -> Entity {
        let mut stored = self.clone();
        stored.owner = None;
        stored.container = None;
        stored.followers = None;
        stored.children = None;
        stored.owns = None;
        stored.teams = None;
        stored.follows = None;
        stored
    }

    /// External JSON form: the child list appears under the kind's field name
    pub fn to_json(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let (Some(field), Some(object)) =
            (self.entity_type.config().child_field(), value.as_object_mut())
        {
            if let Some(children) = object.remove("children") {
                object.insert(field.to_string(), children);
            }
        }
        Ok(value)
    }

    /// Inverse of [`Entity::to_json`]
    pub fn from_json(mut value: Value) -> Result<Entity> {
        let kind: EntityKind = match value.get("entity_type") {
            Some(kind) => serde_json::from_value(kind.clone())?,
            None => return Err(Error::Validation("Document has no entity_type".into())),
        };
        if let (Some(field), Some(object)) = (kind.config().child_field(), value.as_object_mut()) {
            if let Some(children) = object.remove(field) {
                object.insert("children".to_string(), children);
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().flatten().any(|t| t == tag)
    }
}

/// Data for creating a new entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub entity_type: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<EntityReference>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub children: Vec<EntityReference>,
    /// Teams a new user joins
    #[serde(default)]
    pub teams: Vec<EntityReference>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl NewEntity {
    pub fn new(entity_type: EntityKind, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            name: name.into(),
            display_name: None,
            description: None,
            container: None,
            owner: None,
            tags: Vec::new(),
            children: Vec::new(),
            teams: Vec::new(),
            attributes: Map::new(),
        }
    }

    pub fn in_container(mut self, container: EntityReference) -> Self {
        self.container = Some(container);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_owner(mut self, owner: EntityReference) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_child(mut self, child: EntityReference) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_team(mut self, team: EntityReference) -> Self {
        self.teams.push(team);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}
