//! Entity repository: versioned writes, field-selected reads and lineage

use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tessera_core::limits::validate_entity_name;
use tessera_core::{
    CursorPager, Direction, EdgeSelector, Entity, EntityId, EntityKind, EntityLineage,
    EntityReference, Error, Field, FieldSet, KindConfig, LineageQuery, ListFilter, NewEntity,
    PageRequest, Patch, Relation, Relationship, Result, ResultList, UpdateType, VersionDelta,
    VersionEngine, VersionOutcome, INITIAL_VERSION,
};
use tessera_storage::{StorageBackend, StorageError, WriteBatch, WriteOp};

use crate::lineage::LineageEngine;

/// Attempts at an edge insert whose endpoints keep changing underneath it
const EDGE_WRITE_ATTEMPTS: usize = 3;

/// Result of adding a follower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FollowOutcome {
    Created,
    AlreadyExists,
}

/// Every stored version of one entity, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityHistory {
    pub entity_type: EntityKind,
    pub versions: Vec<Entity>,
}

/// Catalog over a storage backend
///
/// Every write is a single [`WriteBatch`]: the new document, its history
/// record and the edges it implies are committed together, guarded by a
/// precondition on the version the update was computed from. Every entity
/// an edge in the batch points at is pinned at the version that was read,
/// so a concurrent delete fails the batch instead of leaving a dangling edge.
pub struct Catalog<S: StorageBackend + ?Sized> {
    storage: Arc<S>,
}

impl<S: StorageBackend + ?Sized> Clone for Catalog<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: StorageBackend + ?Sized> Catalog<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new entity at version 0.1
    pub async fn create(&self, request: NewEntity, principal: &str) -> Result<VersionOutcome> {
        let config = request.entity_type.config();
        let (fqn, container) = self.mint_fqn(&request).await?;

        if self
            .storage
            .get_entity_by_fqn(request.entity_type, &fqn)
            .await?
            .is_some()
        {
            tracing::warn!("Rejected create of existing {} {}", request.entity_type, fqn);
            return Err(Error::already_exists(request.entity_type.as_str(), fqn));
        }

        if request.owner.is_some() && !config.has_owner {
            return Err(Error::Validation(format!("{} does not support an owner", config.kind)));
        }
        if !request.children.is_empty() && !config.children_updatable() {
            return Err(Error::Validation(format!(
                "{} children cannot be set directly",
                config.kind
            )));
        }
        if !request.teams.is_empty() && !config.has_teams {
            return Err(Error::Validation(format!("{} cannot join a team", config.kind)));
        }
        let tags = non_empty(request.tags);
        if tags.is_some() && !config.has_tags {
            return Err(Error::Validation(format!("{} does not support tags", config.kind)));
        }

        let mut entity = Entity {
            id: EntityId::new(),
            entity_type: request.entity_type,
            name: request.name,
            fully_qualified_name: fqn,
            display_name: request.display_name,
            description: request.description,
            version: INITIAL_VERSION,
            updated_by: principal.to_string(),
            updated_at: Utc::now(),
            change_description: None,
            deleted: false,
            owner: request.owner,
            container: container.as_ref().map(Entity::reference),
            followers: None,
            children: non_empty(request.children),
            owns: None,
            teams: non_empty(request.teams),
            follows: None,
            tags,
            attributes: request.attributes,
        };

        let mut batch = WriteBatch::new();
        self.resolve_links(config, &mut entity, &mut batch).await?;
        batch
            .push(WriteOp::PutEntity(entity.clone()))
            .push(WriteOp::PutVersion(entity.clone()));
        if let Some(container) = &container {
            batch.pin(container).push(WriteOp::InsertEdge(Relation::new(
                container.id,
                container.entity_type,
                entity.id,
                entity.entity_type,
                Relationship::Contains,
            )));
        }
        link(config, &entity, &mut batch, false);
        self.storage.commit(batch).await?;

        tracing::info!(
            "Created {} {} ({}) at version {}",
            entity.entity_type,
            entity.fully_qualified_name,
            entity.id,
            entity.version
        );

        Ok(VersionOutcome {
            entity,
            delta: VersionDelta::created(),
        })
    }

    /// Replace the entity with the same derived FQN, or create it
    pub async fn create_or_update(&self, request: NewEntity, principal: &str) -> Result<VersionOutcome> {
        let (fqn, _) = self.mint_fqn(&request).await?;
        let Some(stored) = self
            .storage
            .get_entity_by_fqn(request.entity_type, &fqn)
            .await?
        else {
            return self.create(request, principal).await;
        };

        let original = self.populate(stored, &FieldSet::all_for(request.entity_type)).await?;
        let mut proposed = original.clone();
        proposed.display_name = request.display_name;
        proposed.description = request.description;
        proposed.owner = request.owner;
        proposed.tags = non_empty(request.tags);
        proposed.children = non_empty(request.children);
        proposed.teams = non_empty(request.teams);
        proposed.attributes = request.attributes;

        let base_version = original.version;
        self.update(original, proposed, base_version, principal).await
    }

    /// Full replace of an existing entity
    ///
    /// `proposed.version` must be the version the caller read; a stale
    /// document fails with a concurrent-modification conflict.
    pub async fn replace(&self, id: &EntityId, proposed: Entity, principal: &str) -> Result<VersionOutcome> {
        let original = self.load(id).await?;
        let base_version = proposed.version;
        self.update(original, proposed, base_version, principal).await
    }

    /// Apply a JSON patch to the current document
    pub async fn patch(&self, id: &EntityId, patch: &Patch, principal: &str) -> Result<VersionOutcome> {
        let original = self.load(id).await?;
        let document = patch.apply(&original.to_json()?)?;
        let mut proposed = Entity::from_json(document)
            .map_err(|e| Error::MalformedPatch(format!("Patched document is not a valid entity: {}", e)))?;
        // A removed child or team list means none, not "keep the stored ones"
        let config = original.entity_type.config();
        if proposed.children.is_none() && config.children_updatable() {
            proposed.children = Some(Vec::new());
        }
        if proposed.teams.is_none() && config.has_teams {
            proposed.teams = Some(Vec::new());
        }
        let base_version = original.version;
        self.update(original, proposed, base_version, principal).await
    }

    async fn update(
        &self,
        original: Entity,
        proposed: Entity,
        base_version: f64,
        principal: &str,
    ) -> Result<VersionOutcome> {
        let config = original.entity_type.config();
        if base_version != original.version {
            tracing::warn!(
                "Stale update of {}: based on {}, stored {}",
                original.fully_qualified_name,
                base_version,
                original.version
            );
            return Err(Error::ConcurrentModificationConflict {
                id: original.id.to_string(),
                expected: base_version,
                actual: original.version,
            });
        }

        let mut outcome = VersionEngine::new(config)
            .apply(&original, proposed, principal, Utc::now())
            .map_err(|e| {
                tracing::warn!("Rejected update of {}: {}", original.fully_qualified_name, e);
                e
            })?;

        if outcome.delta.update_type == UpdateType::NoChange {
            tracing::debug!("No change to {}", original.fully_qualified_name);
            return Ok(outcome);
        }

        let mut batch = WriteBatch::new().expect_version(original.id, original.version);
        self.resolve_links(config, &mut outcome.entity, &mut batch).await?;
        let entity = &outcome.entity;
        batch
            .push(WriteOp::PutEntity(entity.clone()))
            .push(WriteOp::PutVersion(entity.clone()));
        link(config, entity, &mut batch, true);
        self.storage.commit(batch).await?;

        tracing::info!(
            "Updated {} {}: {:?} {} -> {}",
            entity.entity_type,
            entity.fully_qualified_name,
            outcome.delta.update_type,
            outcome.delta.previous_version,
            outcome.delta.current_version
        );

        Ok(outcome)
    }

    /// Delete an entity
    ///
    /// Kinds with soft deletion are deactivated as a new version and keep
    /// their document; all others are removed from the current-document
    /// store. Version history is kept either way, and every edge touching
    /// the entity is removed.
    pub async fn delete(&self, id: &EntityId, principal: &str) -> Result<Entity> {
        let original = self.load(id).await?;
        let config = original.entity_type.config();

        if config.soft_delete {
            if original.deleted {
                tracing::debug!("{} already deactivated", original.fully_qualified_name);
                return Ok(original.to_stored());
            }
            let outcome = VersionEngine::new(config).deactivate(&original, principal, Utc::now());
            let entity = outcome.entity.to_stored();
            let batch = WriteBatch::new()
                .expect_version(entity.id, original.version)
                .with(WriteOp::PutEntity(entity.clone()))
                .with(WriteOp::PutVersion(entity.clone()))
                .with(WriteOp::DeleteAllEdges(entity.id));
            self.storage.commit(batch).await?;
            tracing::info!(
                "Deactivated {} {} at version {}",
                entity.entity_type,
                entity.fully_qualified_name,
                entity.version
            );
            return Ok(entity);
        }

        let mut batch = WriteBatch::new().expect_version(original.id, original.version);
        if config.children.is_some_and(|c| c.blocks_delete) {
            batch = batch.expect_no_dependents(
                original.entity_type,
                EdgeSelector::new(original.id, Relationship::Contains, Direction::Outgoing),
            );
        }
        let batch = batch
            .with(WriteOp::DeleteAllEdges(original.id))
            .with(WriteOp::DeleteEntity { id: original.id });

        let summary = self.storage.commit(batch).await.map_err(|e| {
            let e = Error::from(e);
            tracing::warn!("Rejected delete of {}: {}", original.fully_qualified_name, e);
            e
        })?;

        tracing::info!(
            "Deleted {} {} ({} edge(s) removed)",
            original.entity_type,
            original.fully_qualified_name,
            summary.edges_deleted
        );
        Ok(original.to_stored())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Followers and lineage edges
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_follower(&self, id: &EntityId, user_id: &EntityId) -> Result<FollowOutcome> {
        let inserted = self
            .insert_between(id, user_id, |entity, user| {
                if !entity.entity_type.config().has_followers {
                    return Err(Error::Validation(format!(
                        "{} does not support followers",
                        entity.entity_type
                    )));
                }
                check_follower(user)?;
                Ok(Relation::new(
                    user.id,
                    EntityKind::User,
                    entity.id,
                    entity.entity_type,
                    Relationship::Follows,
                ))
            })
            .await?;

        if inserted {
            tracing::info!("{} now follows {}", user_id, id);
            Ok(FollowOutcome::Created)
        } else {
            Ok(FollowOutcome::AlreadyExists)
        }
    }

    /// Returns false if the user was not following the entity
    pub async fn remove_follower(&self, id: &EntityId, user_id: &EntityId) -> Result<bool> {
        let entity = self.stored(id).await?;
        let user = self.stored(user_id).await?;
        let edge = Relation::new(user.id, user.entity_type, entity.id, entity.entity_type, Relationship::Follows);
        let removed = self.storage.delete_edge(&edge).await?;
        if removed {
            tracing::info!("{} unfollowed {}", user.name, entity.fully_qualified_name);
        }
        Ok(removed)
    }

    /// Record that data flows from `from` to `to`; returns false if already recorded
    pub async fn add_lineage(&self, from: &EntityId, to: &EntityId) -> Result<bool> {
        if from == to {
            return Err(Error::Validation(format!("Entity {} cannot feed itself", from)));
        }
        let inserted = self
            .insert_between(from, to, |from, to| {
                Ok(Relation::new(from.id, from.entity_type, to.id, to.entity_type, Relationship::Lineage))
            })
            .await?;
        tracing::info!("Lineage {} -> {} (new: {})", from, to, inserted);
        Ok(inserted)
    }

    /// Returns false if no such lineage edge was recorded
    pub async fn remove_lineage(&self, from: &EntityId, to: &EntityId) -> Result<bool> {
        let edge = self.lineage_edge(from, to).await?;
        Ok(self.storage.delete_edge(&edge).await?)
    }

    async fn lineage_edge(&self, from: &EntityId, to: &EntityId) -> Result<Relation> {
        let from = self.stored(from).await?;
        let to = self.stored(to).await?;
        Ok(Relation::new(from.id, from.entity_type, to.id, to.entity_type, Relationship::Lineage))
    }

    /// Insert the edge `build` derives from two stored entities, in a batch
    /// that pins both at the versions read; returns false if already stored
    ///
    /// A version conflict means an endpoint was updated in between, so the
    /// endpoints are read again and the insert retried. A deleted endpoint
    /// fails the batch with not-found.
    async fn insert_between<F>(&self, first: &EntityId, second: &EntityId, build: F) -> Result<bool>
    where
        F: Fn(&Entity, &Entity) -> Result<Relation> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let a = self.stored(first).await?;
            let b = self.stored(second).await?;
            let edge = build(&a, &b)?;

            let batch = WriteBatch::new()
                .expect_version(a.id, a.version)
                .expect_version(b.id, b.version)
                .with(WriteOp::InsertEdge(edge));
            match self.storage.commit(batch).await {
                Ok(summary) => return Ok(summary.edges_inserted > 0),
                Err(StorageError::Conflict { id, .. }) if attempt < EDGE_WRITE_ATTEMPTS => {
                    tracing::debug!("{} changed during edge insert, retrying", id);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get(&self, id: &EntityId, fields: &FieldSet) -> Result<Entity> {
        let entity = self.stored(id).await?;
        self.populate(entity, fields).await
    }

    pub async fn get_by_name(&self, kind: EntityKind, fqn: &str, fields: &FieldSet) -> Result<Entity> {
        let entity = self
            .storage
            .get_entity_by_fqn(kind, fqn)
            .await?
            .ok_or_else(|| Error::not_found(kind.as_str(), fqn))?;
        self.populate(entity, fields).await
    }

    /// One page of entities of `kind`, ordered by FQN
    pub async fn list(
        &self,
        kind: EntityKind,
        filter: &ListFilter,
        fields: &FieldSet,
        page: &PageRequest,
    ) -> Result<ResultList<Entity>> {
        let rows: Vec<Entity> = self
            .storage
            .list_entities(kind)
            .await?
            .into_iter()
            .filter(|e| filter.matches(&e.fully_qualified_name))
            .collect();

        let page = CursorPager::paginate(rows, |e: &Entity| e.fully_qualified_name.as_str(), page)?;
        let mut data = Vec::with_capacity(page.len());
        for entity in page.data {
            data.push(self.populate(entity, fields).await?);
        }
        Ok(ResultList {
            data,
            paging: page.paging,
        })
    }

    pub async fn get_lineage(&self, id: &EntityId, upstream_depth: i32, downstream_depth: i32) -> Result<EntityLineage> {
        let query = LineageQuery::new(upstream_depth, downstream_depth)?;
        let focal = self.stored(id).await?;
        LineageEngine::new(self.storage.as_ref()).traverse(&focal, query).await
    }

    pub async fn get_lineage_by_name(
        &self,
        kind: EntityKind,
        fqn: &str,
        upstream_depth: i32,
        downstream_depth: i32,
    ) -> Result<EntityLineage> {
        let query = LineageQuery::new(upstream_depth, downstream_depth)?;
        let focal = self
            .storage
            .get_entity_by_fqn(kind, fqn)
            .await?
            .ok_or_else(|| Error::not_found(kind.as_str(), fqn))?;
        LineageEngine::new(self.storage.as_ref()).traverse(&focal, query).await
    }

    /// Every stored version, newest first
    ///
    /// History outlives hard deletion, so this works for removed entities too.
    pub async fn list_versions(&self, id: &EntityId) -> Result<EntityHistory> {
        let mut versions = self.storage.list_versions(id).await?;
        let Some(entity_type) = versions.first().map(|v| v.entity_type) else {
            return Err(Error::not_found("entity", id));
        };
        versions.reverse();
        Ok(EntityHistory {
            entity_type,
            versions,
        })
    }

    pub async fn get_version(&self, id: &EntityId, version: f64) -> Result<Entity> {
        self.storage
            .get_version(id, version)
            .await?
            .ok_or_else(|| Error::not_found("entity", format!("{} version {}", id, version)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn stored(&self, id: &EntityId) -> Result<Entity> {
        self.storage
            .get_entity(id)
            .await?
            .ok_or_else(|| Error::not_found("entity", id))
    }

    /// Current document with every relationship-derived field populated
    async fn load(&self, id: &EntityId) -> Result<Entity> {
        let entity = self.stored(id).await?;
        let fields = FieldSet::all_for(entity.entity_type);
        self.populate(entity, &fields).await
    }

    /// Rebuild relationship-derived fields from the graph
    async fn populate(&self, mut entity: Entity, fields: &FieldSet) -> Result<Entity> {
        let config = entity.entity_type.config();
        let id = entity.id;

        if !config.containers.is_empty() {
            let selector = EdgeSelector::new(id, Relationship::Contains, Direction::Incoming);
            let container = self
                .storage
                .find_edges(&selector)
                .await?
                .into_iter()
                .find(|e| config.containers.contains(&e.from_type));
            entity.container = match container {
                Some(edge) => self.reference(&edge.from_id).await?,
                None => None,
            };
        }

        entity.owner = if fields.contains(Field::Owner) {
            let owners = self.storage.find_from(&id, Relationship::Owns, None).await?;
            match owners.first() {
                Some(owner) => self.reference(owner).await?,
                None => None,
            }
        } else {
            None
        };

        entity.followers = if fields.contains(Field::Followers) {
            let ids = self
                .storage
                .find_from(&id, Relationship::Follows, Some(EntityKind::User))
                .await?;
            Some(self.references(&ids).await?)
        } else {
            None
        };

        entity.children = match config.children {
            Some(child) if fields.contains(Field::Children) => {
                let ids = self
                    .storage
                    .find_to(&id, Relationship::Contains, Some(child.kind))
                    .await?;
                Some(self.references(&ids).await?)
            }
            _ => None,
        };

        entity.owns = if fields.contains(Field::Owns) {
            let ids = self.storage.find_to(&id, Relationship::Owns, None).await?;
            Some(self.references(&ids).await?)
        } else {
            None
        };

        entity.teams = if fields.contains(Field::Teams) {
            let ids = self
                .storage
                .find_from(&id, Relationship::Contains, Some(EntityKind::Team))
                .await?;
            Some(self.references(&ids).await?)
        } else {
            None
        };

        entity.follows = if fields.contains(Field::Follows) {
            let ids = self.storage.find_to(&id, Relationship::Follows, None).await?;
            Some(self.references(&ids).await?)
        } else {
            None
        };

        if !fields.contains(Field::Tags) {
            entity.tags = None;
        }

        Ok(entity)
    }

    async fn reference(&self, id: &EntityId) -> Result<Option<EntityReference>> {
        Ok(self.storage.get_entity(id).await?.map(|e| e.reference()))
    }

    async fn references(&self, ids: &[EntityId]) -> Result<Vec<EntityReference>> {
        let resolved = try_join_all(ids.iter().map(|id| self.reference(id))).await?;
        Ok(ids
            .iter()
            .zip(resolved)
            .filter_map(|(id, reference)| {
                if reference.is_none() {
                    tracing::warn!("Dangling edge to missing entity {}", id);
                }
                reference
            })
            .collect())
    }

    /// Derive the FQN and resolve the container a request names
    async fn mint_fqn(&self, request: &NewEntity) -> Result<(String, Option<Entity>)> {
        validate_entity_name(&request.name)?;
        let config = request.entity_type.config();

        if config.containers.is_empty() {
            if request.container.is_some() {
                return Err(Error::Validation(format!(
                    "{} cannot be placed in a container",
                    config.kind
                )));
            }
            return Ok((config.fqn(None, &request.name), None));
        }

        let Some(requested) = &request.container else {
            return Err(Error::Validation(format!(
                "{} requires a container of type {}",
                config.kind,
                kind_list(config.containers)
            )));
        };
        let container = self.resolve(requested, config.containers, "container").await?;
        let fqn = config.fqn(Some(&container.fully_qualified_name), &request.name);
        Ok((fqn, Some(container)))
    }

    /// Resolve every reference [`link`] turns into an edge and pin it in `batch`
    ///
    /// Unsupported fields are left alone; the version engine has already
    /// restored them from the stored document.
    async fn resolve_links(&self, config: &KindConfig, entity: &mut Entity, batch: &mut WriteBatch) -> Result<()> {
        if config.has_owner {
            if let Some(owner) = entity.owner.take() {
                let owner = self
                    .resolve(&owner, &[EntityKind::User, EntityKind::Team], "owner")
                    .await?;
                batch.pin(&owner);
                entity.owner = Some(owner.reference());
            }
        }
        if let Some(spec) = config.children.filter(|_| config.children_updatable()) {
            if let Some(children) = entity.children.take() {
                entity.children = Some(self.resolve_all(&children, &[spec.kind], spec.field, batch).await?);
            }
        }
        if config.has_teams {
            if let Some(teams) = entity.teams.take() {
                entity.teams = Some(self.resolve_all(&teams, &[EntityKind::Team], "team", batch).await?);
            }
        }
        Ok(())
    }

    async fn resolve_all(
        &self,
        references: &[EntityReference],
        allowed: &[EntityKind],
        role: &str,
        batch: &mut WriteBatch,
    ) -> Result<Vec<EntityReference>> {
        let mut resolved = Vec::with_capacity(references.len());
        for reference in references {
            let entity = self.resolve(reference, allowed, role).await?;
            batch.pin(&entity);
            resolved.push(entity.reference());
        }
        Ok(resolved)
    }

    /// Look up a caller-supplied reference and check its kind
    async fn resolve(&self, reference: &EntityReference, allowed: &[EntityKind], role: &str) -> Result<Entity> {
        let entity = self
            .storage
            .get_entity(&reference.id)
            .await?
            .ok_or_else(|| Error::not_found(reference.entity_type.as_str(), reference.id))?;
        if !allowed.contains(&entity.entity_type) {
            return Err(Error::Validation(format!(
                "Invalid {} {}: expected {}, found {}",
                role,
                entity.id,
                kind_list(allowed),
                entity.entity_type
            )));
        }
        if entity.deleted {
            return Err(Error::Validation(format!(
                "Invalid {} {}: {} is deactivated",
                role, entity.id, entity.fully_qualified_name
            )));
        }
        Ok(entity)
    }
}

fn check_follower(user: &Entity) -> Result<()> {
    if user.entity_type != EntityKind::User {
        return Err(Error::Validation(format!(
            "Follower {} is a {}, not a user",
            user.id, user.entity_type
        )));
    }
    if user.deleted {
        return Err(Error::Validation(format!("User {} is deactivated", user.name)));
    }
    Ok(())
}

/// Add the OWNS, child CONTAINS and team membership edges `entity` implies
///
/// With `replace` set, the existing edges of each relationship are removed
/// first so the stored graph matches the document exactly.
fn link(config: &KindConfig, entity: &Entity, batch: &mut WriteBatch, replace: bool) {
    if config.has_owner {
        if replace {
            batch.push(WriteOp::DeleteEdges(EdgeSelector::new(
                entity.id,
                Relationship::Owns,
                Direction::Incoming,
            )));
        }
        if let Some(owner) = &entity.owner {
            batch.push(WriteOp::InsertEdge(Relation::new(
                owner.id,
                owner.entity_type,
                entity.id,
                entity.entity_type,
                Relationship::Owns,
            )));
        }
    }

    if let Some(spec) = config.children.filter(|_| config.children_updatable()) {
        if replace {
            batch.push(WriteOp::DeleteEdges(
                EdgeSelector::new(entity.id, Relationship::Contains, Direction::Outgoing)
                    .with_peer_type(spec.kind),
            ));
        }
        for child in entity.children.iter().flatten() {
            batch.push(WriteOp::InsertEdge(Relation::new(
                entity.id,
                entity.entity_type,
                child.id,
                child.entity_type,
                Relationship::Contains,
            )));
        }
    }

    if config.has_teams {
        if replace {
            batch.push(WriteOp::DeleteEdges(
                EdgeSelector::new(entity.id, Relationship::Contains, Direction::Incoming)
                    .with_peer_type(EntityKind::Team),
            ));
        }
        for team in entity.teams.iter().flatten() {
            batch.push(WriteOp::InsertEdge(Relation::new(
                team.id,
                team.entity_type,
                entity.id,
                entity.entity_type,
                Relationship::Contains,
            )));
        }
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}

fn kind_list(kinds: &[EntityKind]) -> String {
    kinds
        .iter()
        .map(EntityKind::as_str)
        .collect::<Vec<_>>()
        .join(" or ")
}
