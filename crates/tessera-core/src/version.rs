//! Version engine: merges a proposed entity state into the stored one
//!
//! The engine is pure. Given the stored entity (with its relationship-derived
//! fields populated) and a proposed replacement it:
//!
//! 1. rejects changes to the kind's read-only fields,
//! 2. restores identity and unclassified fields from the stored document,
//! 3. runs the kind's child-list merge hook,
//! 4. diffs every classified field and derives the version transition.
//!
//! Persisting the result is the caller's job.

use crate::entity::{Entity, EntityReference};
use crate::error::{Error, Result};
use crate::kind::{ChildMerge, KindConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Version assigned to a newly created entity
pub const INITIAL_VERSION: f64 = 0.1;

/// History key of a version: the number of tenths it carries
///
/// Versions only ever move in steps of 0.1 or to the next whole number, so a
/// value between two tenths (0.15) names no stored version and yields `None`.
pub fn version_tenths(version: f64) -> Option<i64> {
    let scaled = version * 10.0;
    if !scaled.is_finite() || (scaled - scaled.round()).abs() > 1e-6 {
        return None;
    }
    Some(scaled.round() as i64)
}

/// Field-level diff between two consecutive versions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeDescription {
    pub previous_version: f64,
    #[serde(default)]
    pub fields_added: Vec<String>,
    #[serde(default)]
    pub fields_updated: Vec<String>,
    #[serde(default)]
    pub fields_deleted: Vec<String>,
}

impl ChangeDescription {
    pub fn new(previous_version: f64) -> Self {
        Self {
            previous_version,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields_added.is_empty() && self.fields_updated.is_empty() && self.fields_deleted.is_empty()
    }

    /// Every field name touched by this change
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields_added
            .iter()
            .chain(self.fields_updated.iter())
            .chain(self.fields_deleted.iter())
            .map(String::as_str)
    }
}

/// Decision class of an accepted write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateType {
    Created,
    NoChange,
    MinorUpdate,
    MajorUpdate,
}

/// Version transition produced by a write
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VersionDelta {
    pub update_type: UpdateType,
    pub previous_version: f64,
    pub current_version: f64,
}

impl VersionDelta {
    pub fn created() -> Self {
        Self {
            update_type: UpdateType::Created,
            previous_version: INITIAL_VERSION,
            current_version: INITIAL_VERSION,
        }
    }

    /// Whether the write produced a new version record
    pub fn is_new_version(&self) -> bool {
        self.update_type != UpdateType::NoChange
    }
}

/// Result of merging a proposed entity into the stored one
#[derive(Debug, Clone)]
pub struct VersionOutcome {
    pub entity: Entity,
    pub delta: VersionDelta,
}

/// Per-kind merge and versioning rules
#[derive(Debug, Clone, Copy)]
pub struct VersionEngine {
    config: &'static KindConfig,
}

impl VersionEngine {
    pub fn new(config: &'static KindConfig) -> Self {
        Self { config }
    }

    /// Version after applying an update of the given class to `current`
    pub fn next_version(current: f64, update_type: UpdateType) -> f64 {
        match update_type {
            UpdateType::Created => INITIAL_VERSION,
            UpdateType::NoChange => current,
            UpdateType::MinorUpdate => ((current * 10.0).round() + 1.0) / 10.0,
            UpdateType::MajorUpdate => current.floor() + 1.0,
        }
    }

    /// Merge `proposed` into `original` and derive the version transition
    ///
    /// `original` must carry every relationship-derived field the kind
    /// supports so owner and child-list changes are visible to the diff.
    pub fn apply(
        &self,
        original: &Entity,
        proposed: Entity,
        principal: &str,
        now: DateTime<Utc>,
    ) -> Result<VersionOutcome> {
        self.check_read_only(original, &proposed)?;

        let merged = self.restore(original, proposed);
        let change = self.diff(original, &merged);

        if change.is_empty() {
            return Ok(VersionOutcome {
                entity: original.clone(),
                delta: VersionDelta {
                    update_type: UpdateType::NoChange,
                    previous_version: original.version,
                    current_version: original.version,
                },
            });
        }

        let update_type = if change.fields().any(|f| self.config.is_major(f)) {
            UpdateType::MajorUpdate
        } else {
            UpdateType::MinorUpdate
        };

        Ok(self.stamp(original, merged, change, update_type, principal, now))
    }

    /// Mark an entity deleted as a MINOR update, bypassing the read-only check
    pub fn deactivate(&self, original: &Entity, principal: &str, now: DateTime<Utc>) -> VersionOutcome {
        let mut merged = original.clone();
        merged.deleted = true;
        let mut change = ChangeDescription::new(original.version);
        change.fields_updated.push("deleted".to_string());
        self.stamp(original, merged, change, UpdateType::MinorUpdate, principal, now)
    }

    fn stamp(
        &self,
        original: &Entity,
        mut merged: Entity,
        change: ChangeDescription,
        update_type: UpdateType,
        principal: &str,
        now: DateTime<Utc>,
    ) -> VersionOutcome {
        let current_version = Self::next_version(original.version, update_type);
        merged.version = current_version;
        merged.updated_by = principal.to_string();
        merged.updated_at = now;
        merged.change_description = Some(change);

        VersionOutcome {
            entity: merged,
            delta: VersionDelta {
                update_type,
                previous_version: original.version,
                current_version,
            },
        }
    }

    fn check_read_only(&self, original: &Entity, proposed: &Entity) -> Result<()> {
        for field in self.config.read_only_fields {
            let before = normalize(self.field_value(original, field));
            let after = normalize(self.field_value(proposed, field));
            if before != after {
                return Err(Error::read_only(self.config.kind.as_str(), *field));
            }
        }
        Ok(())
    }

    /// Copy identity, relationship-owned and unclassified fields back from the original
    fn restore(&self, original: &Entity, mut proposed: Entity) -> Entity {
        let config = self.config;

        proposed.id = original.id;
        proposed.entity_type = original.entity_type;
        proposed.name = original.name.clone();
        proposed.fully_qualified_name = original.fully_qualified_name.clone();
        proposed.container = original.container.clone();
        proposed.version = original.version;
        proposed.updated_by = original.updated_by.clone();
        proposed.updated_at = original.updated_at;
        proposed.change_description = original.change_description.clone();
        proposed.deleted = original.deleted;
        proposed.followers = original.followers.clone();
        proposed.owns = original.owns.clone();
        proposed.follows = original.follows.clone();

        if !config.is_versioned("display_name") {
            proposed.display_name = original.display_name.clone();
        }
        if !config.is_versioned("description") {
            proposed.description = original.description.clone();
        }
        if !config.has_owner {
            proposed.owner = original.owner.clone();
        }
        if !config.has_tags {
            proposed.tags = original.tags.clone();
        }

        proposed.children = match config.children.map(|c| c.merge) {
            None | Some(ChildMerge::Derived) => original.children.clone(),
            Some(ChildMerge::Replace) => proposed.children.or_else(|| original.children.clone()),
            Some(ChildMerge::Union) => union_children(original.children.as_deref(), proposed.children),
        };
        proposed.teams = if config.has_teams {
            proposed.teams.or_else(|| original.teams.clone())
        } else {
            original.teams.clone()
        };

        let mut attributes = original.attributes.clone();
        for field in config.versioned_fields().filter(|f| !self.is_builtin(f)) {
            match proposed.attributes.remove(field) {
                Some(value) => attributes.insert(field.to_string(), value),
                None => attributes.remove(field),
            };
        }
        proposed.attributes = attributes;

        proposed
    }

    fn diff(&self, original: &Entity, merged: &Entity) -> ChangeDescription {
        let mut change = ChangeDescription::new(original.version);
        for field in self.config.versioned_fields() {
            let before = normalize(self.field_value(original, field));
            let after = normalize(self.field_value(merged, field));
            match (before, after) {
                (None, None) => {}
                (None, Some(_)) => change.fields_added.push(field.to_string()),
                (Some(_), None) => change.fields_deleted.push(field.to_string()),
                (Some(a), Some(b)) if a != b => change.fields_updated.push(field.to_string()),
                _ => {}
            }
        }
        change
    }

    fn is_builtin(&self, field: &str) -> bool {
        matches!(field, "display_name" | "description" | "owner" | "tags" | "deleted" | "teams")
            || self.config.child_field() == Some(field)
    }

    /// Comparable view of one named field
    fn field_value(&self, entity: &Entity, field: &str) -> Value {
        match field {
            "display_name" => opt_string(&entity.display_name),
            "description" => opt_string(&entity.description),
            "owner" => entity
                .owner
                .as_ref()
                .map(|o| Value::String(o.id.to_string()))
                .unwrap_or(Value::Null),
            "tags" => entity
                .tags
                .as_ref()
                .map(|tags| Value::from(tags.clone()))
                .unwrap_or(Value::Null),
            "deleted" => Value::Bool(entity.deleted),
            "teams" => reference_ids(&entity.teams),
            f if self.config.child_field() == Some(f) => reference_ids(&entity.children),
            f => entity.attributes.get(f).cloned().unwrap_or(Value::Null),
        }
    }
}

fn reference_ids(references: &Option<Vec<EntityReference>>) -> Value {
    references
        .as_ref()
        .map(|refs| refs.iter().map(|r| Value::String(r.id.to_string())).collect())
        .unwrap_or(Value::Null)
}

fn opt_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

/// Null, empty strings, empty arrays and empty objects all read as absent
fn normalize(value: Value) -> Option<Value> {
    match &value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        _ => Some(value),
    }
}

/// Stored children first, then proposed children not already present, keyed by id
fn union_children(
    stored: Option<&[EntityReference]>,
    proposed: Option<Vec<EntityReference>>,
) -> Option<Vec<EntityReference>> {
    let Some(proposed) = proposed else {
        return stored.map(<[EntityReference]>::to_vec);
    };
    let mut merged: Vec<EntityReference> = stored.map(<[EntityReference]>::to_vec).unwrap_or_default();
    let mut seen: HashSet<_> = merged.iter().map(|c| c.id).collect();
    for child in proposed {
        if seen.insert(child.id) {
            merged.push(child);
        }
    }
    Some(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::error::ErrorKind;
    use crate::kind::EntityKind;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    fn entity(kind: EntityKind, name: &str) -> Entity {
        Entity {
            id: EntityId::new(),
            entity_type: kind,
            name: name.into(),
            fully_qualified_name: format!("svc.{}", name),
            display_name: None,
            description: None,
            version: INITIAL_VERSION,
            updated_by: "admin".into(),
            updated_at: Utc::now(),
            change_description: None,
            deleted: false,
            owner: None,
            container: None,
            followers: None,
            children: None,
            owns: None,
            teams: None,
            follows: None,
            tags: None,
            attributes: Map::new(),
        }
    }

    fn engine(kind: EntityKind) -> VersionEngine {
        VersionEngine::new(kind.config())
    }

    #[test]
    fn test_identical_proposal_is_no_change() {
        let table = entity(EntityKind::Table, "orders");
        let outcome = engine(EntityKind::Table)
            .apply(&table, table.clone(), "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::NoChange);
        assert_eq!(outcome.entity, table);
        assert!(!outcome.delta.is_new_version());
    }

    #[test]
    fn test_empty_values_compare_as_absent() {
        let table = entity(EntityKind::Table, "orders");
        let mut proposed = table.clone();
        proposed.description = Some(String::new());
        proposed.tags = Some(vec![]);
        let outcome = engine(EntityKind::Table)
            .apply(&table, proposed, "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::NoChange);
    }

    #[test]
    fn test_description_change_is_minor() {
        let table = entity(EntityKind::Table, "orders");
        let mut proposed = table.clone();
        proposed.description = Some("Customer orders".into());

        let outcome = engine(EntityKind::Table)
            .apply(&table, proposed, "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::MinorUpdate);
        assert_eq!(outcome.entity.version, 0.2);
        assert_eq!(outcome.entity.updated_by, "bob");
        let change = outcome.entity.change_description.unwrap();
        assert_eq!(change.previous_version, 0.1);
        assert_eq!(change.fields_added, vec!["description".to_string()]);
    }

    #[test]
    fn test_column_change_is_major() {
        let mut table = entity(EntityKind::Table, "orders");
        table.version = 1.3;
        table.attributes.insert("columns".into(), json!([{"name": "id"}]));
        let mut proposed = table.clone();
        proposed.attributes.insert("columns".into(), json!([{"name": "id"}, {"name": "total"}]));
        proposed.description = Some("Orders".into());

        let outcome = engine(EntityKind::Table)
            .apply(&table, proposed, "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::MajorUpdate);
        assert_eq!(outcome.entity.version, 2.0);
        let change = outcome.entity.change_description.unwrap();
        assert_eq!(change.fields_updated, vec!["columns".to_string()]);
        assert_eq!(change.fields_added, vec!["description".to_string()]);
    }

    #[test]
    fn test_identity_fields_are_restored() {
        let table = entity(EntityKind::Table, "orders");
        let mut proposed = table.clone();
        proposed.id = EntityId::new();
        proposed.name = "renamed".into();
        proposed.fully_qualified_name = "svc.renamed".into();
        proposed.version = 42.0;

        let outcome = engine(EntityKind::Table)
            .apply(&table, proposed, "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::NoChange);
        assert_eq!(outcome.entity.id, table.id);
        assert_eq!(outcome.entity.fully_qualified_name, "svc.orders");
    }

    #[test]
    fn test_unclassified_attributes_are_restored() {
        let mut table = entity(EntityKind::Table, "orders");
        table.attributes.insert("usage_summary".into(), json!({"daily": 3}));
        let mut proposed = table.clone();
        proposed.attributes.insert("usage_summary".into(), json!({"daily": 99}));
        proposed.attributes.insert("unknown".into(), json!(true));

        let outcome = engine(EntityKind::Table)
            .apply(&table, proposed, "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::NoChange);
        assert_eq!(outcome.entity.attributes["usage_summary"], json!({"daily": 3}));
        assert!(!outcome.entity.attributes.contains_key("unknown"));
    }

    #[test]
    fn test_read_only_field_violation() {
        let team = entity(EntityKind::Team, "platform");
        let mut proposed = team.clone();
        proposed.deleted = true;
        proposed.description = Some("changed too".into());

        let err = engine(EntityKind::Team)
            .apply(&team, proposed, "bob", Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadOnlyFieldViolation);
        assert_eq!(err.to_string(), "Entity team attribute deleted can't be modified");
    }

    #[test]
    fn test_pipeline_tasks_are_unioned_by_id() {
        let a = EntityReference::new(EntityId::new(), EntityKind::Task);
        let b = EntityReference::new(EntityId::new(), EntityKind::Task);
        let c = EntityReference::new(EntityId::new(), EntityKind::Task);

        let mut pipeline = entity(EntityKind::Pipeline, "etl");
        pipeline.children = Some(vec![a.clone(), b.clone()]);
        let mut proposed = pipeline.clone();
        proposed.children = Some(vec![b.clone(), c.clone()]);

        let outcome = engine(EntityKind::Pipeline)
            .apply(&pipeline, proposed, "bob", Utc::now())
            .unwrap();
        let ids: Vec<_> = outcome.entity.children.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(
            outcome.entity.change_description.unwrap().fields_updated,
            vec!["tasks".to_string()]
        );
    }

    #[test]
    fn test_partial_task_report_keeps_existing_tasks() {
        let a = EntityReference::new(EntityId::new(), EntityKind::Task);
        let mut pipeline = entity(EntityKind::Pipeline, "etl");
        pipeline.children = Some(vec![a.clone()]);
        let mut proposed = pipeline.clone();
        proposed.children = Some(vec![a]);

        let outcome = engine(EntityKind::Pipeline)
            .apply(&pipeline, proposed, "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::NoChange);
    }

    #[test]
    fn test_team_users_are_replaced() {
        let alice = EntityReference::new(EntityId::new(), EntityKind::User);
        let bob = EntityReference::new(EntityId::new(), EntityKind::User);
        let mut team = entity(EntityKind::Team, "platform");
        team.children = Some(vec![alice]);
        let mut proposed = team.clone();
        proposed.children = Some(vec![bob.clone()]);

        let outcome = engine(EntityKind::Team)
            .apply(&team, proposed, "admin", Utc::now())
            .unwrap();
        assert_eq!(outcome.entity.children, Some(vec![bob]));
        assert_eq!(outcome.delta.update_type, UpdateType::MinorUpdate);
    }

    #[test]
    fn test_user_team_membership_is_minor() {
        let data = EntityReference::new(EntityId::new(), EntityKind::Team);
        let ops = EntityReference::new(EntityId::new(), EntityKind::Team);
        let followed = EntityReference::new(EntityId::new(), EntityKind::Table);
        let mut user = entity(EntityKind::User, "alice");
        user.teams = Some(vec![data.clone()]);
        user.follows = Some(vec![followed.clone()]);

        let mut proposed = user.clone();
        proposed.teams = Some(vec![data.clone(), ops]);
        proposed.follows = None;
        let outcome = engine(EntityKind::User)
            .apply(&user, proposed, "admin", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::MinorUpdate);
        let change = outcome.entity.change_description.as_ref().unwrap();
        assert_eq!(change.fields_updated, vec!["teams".to_string()]);
        assert_eq!(outcome.entity.follows, Some(vec![followed]));

        // Leaving teams out keeps the stored membership
        let mut proposed = user.clone();
        proposed.teams = None;
        let outcome = engine(EntityKind::User)
            .apply(&user, proposed, "admin", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::NoChange);
    }

    #[test]
    fn test_derived_children_cannot_be_updated() {
        let mut service = entity(EntityKind::PipelineService, "airflow");
        service.children = Some(vec![EntityReference::new(EntityId::new(), EntityKind::Pipeline)]);
        let mut proposed = service.clone();
        proposed.children = Some(vec![]);

        let outcome = engine(EntityKind::PipelineService)
            .apply(&service, proposed, "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::NoChange);
        assert_eq!(outcome.entity.children, service.children);
    }

    #[test]
    fn test_owner_change_is_minor() {
        let table = entity(EntityKind::Table, "orders");
        let mut proposed = table.clone();
        proposed.owner = Some(EntityReference::new(EntityId::new(), EntityKind::Team));

        let outcome = engine(EntityKind::Table)
            .apply(&table, proposed, "bob", Utc::now())
            .unwrap();
        assert_eq!(outcome.delta.update_type, UpdateType::MinorUpdate);
        assert!(outcome.entity.owner.is_some());
    }

    #[test]
    fn test_deactivate_bumps_minor() {
        let user = entity(EntityKind::User, "alice");
        let outcome = engine(EntityKind::User).deactivate(&user, "admin", Utc::now());
        assert!(outcome.entity.deleted);
        assert_eq!(outcome.entity.version, 0.2);
        assert_eq!(outcome.delta.update_type, UpdateType::MinorUpdate);
    }

    #[test]
    fn test_minor_rolls_over_to_next_integer() {
        assert_eq!(VersionEngine::next_version(1.9, UpdateType::MinorUpdate), 2.0);
        assert_eq!(VersionEngine::next_version(0.1, UpdateType::MinorUpdate), 0.2);
        assert_eq!(VersionEngine::next_version(0.7, UpdateType::MajorUpdate), 1.0);
        assert_eq!(VersionEngine::next_version(3.4, UpdateType::NoChange), 3.4);
    }

    #[test]
    fn test_version_tenths_rejects_values_between_tenths() {
        assert_eq!(version_tenths(0.1), Some(1));
        assert_eq!(version_tenths(2.0), Some(20));
        assert_eq!(version_tenths(0.15), None);
        assert_eq!(version_tenths(0.19), None);
        assert_eq!(version_tenths(f64::NAN), None);
    }

    proptest! {
        #[test]
        fn prop_every_reachable_version_has_a_key(major in 0u32..500, minor in 0u32..10) {
            let version = major as f64 + minor as f64 / 10.0;
            let next = VersionEngine::next_version(version, UpdateType::MinorUpdate);
            prop_assert_eq!(version_tenths(next), Some((major * 10 + minor) as i64 + 1));
        }

        #[test]
        fn prop_minor_adds_one_tenth(major in 0u32..500, minor in 0u32..10) {
            let version = major as f64 + minor as f64 / 10.0;
            let next = VersionEngine::next_version(version, UpdateType::MinorUpdate);
            let frac = ((version - version.floor()) * 10.0).round() / 10.0;
            let expected = version.floor() + frac + 0.1;
            prop_assert!((next - expected).abs() < 1e-9);
        }

        #[test]
        fn prop_major_goes_to_next_integer(major in 0u32..500, minor in 0u32..10) {
            let version = major as f64 + minor as f64 / 10.0;
            let next = VersionEngine::next_version(version, UpdateType::MajorUpdate);
            prop_assert_eq!(next, major as f64 + 1.0);
        }

        #[test]
        fn prop_versions_never_decrease(major in 0u32..500, minor in 0u32..10) {
            let version = major as f64 + minor as f64 / 10.0;
            for update in [UpdateType::NoChange, UpdateType::MinorUpdate, UpdateType::MajorUpdate] {
                prop_assert!(VersionEngine::next_version(version, update) >= version);
            }
        }
    }
}
