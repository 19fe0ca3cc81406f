//! Behaviour every backend must share, run from each backend's tests

use crate::batch::{WriteBatch, WriteOp};
use crate::error::StorageError;
use crate::traits::StorageBackend;
use chrono::Utc;
use serde_json::Map;
use std::collections::HashSet;
use std::sync::Arc;
use tessera_core::{
    Direction, EdgeSelector, Entity, EntityId, EntityKind, EntityReference, Relation, Relationship,
};

pub(crate) fn entity(kind: EntityKind, fqn: &str, version: f64) -> Entity {
    Entity {
        id: EntityId::new(),
        entity_type: kind,
        name: fqn.rsplit('.').next().unwrap_or(fqn).to_string(),
        fully_qualified_name: fqn.to_string(),
        display_name: None,
        description: None,
        version,
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

pub(crate) fn contains(from: &Entity, to: &Entity) -> Relation {
    Relation::new(from.id, from.entity_type, to.id, to.entity_type, Relationship::Contains)
}

pub(crate) async fn run_all<S: StorageBackend>(storage: &S) {
    storage.initialize().await.unwrap();
    assert!(storage.health_check().await.unwrap());

    documents(storage).await;
    duplicate_fqn_aborts_batch(storage).await;
    history(storage).await;
    version_precondition(storage).await;
    edges(storage).await;
    failed_batch_keeps_edges(storage).await;
    dependents_precondition(storage).await;
}

/// Racing inserts of overlapping edges from one source store each edge once
pub(crate) async fn concurrent_edge_inserts<S: StorageBackend + 'static>(storage: Arc<S>) {
    storage.initialize().await.unwrap();

    let source = entity(EntityKind::Table, "mysql.shop.raw_orders", 0.1);
    let targets: Vec<Entity> = (0..8)
        .map(|i| entity(EntityKind::Table, &format!("mysql.shop.orders_{}", i), 0.1))
        .collect();

    let mut handles = Vec::new();
    for _ in 0..3 {
        for target in &targets {
            let storage = Arc::clone(&storage);
            let edge = Relation::new(
                source.id,
                source.entity_type,
                target.id,
                target.entity_type,
                Relationship::Lineage,
            );
            handles.push(tokio::spawn(async move { storage.insert_edge(&edge).await }));
        }
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, targets.len(), "each edge reports inserted exactly once");

    let stored = storage
        .find_to(&source.id, Relationship::Lineage, None)
        .await
        .unwrap();
    let unique: HashSet<EntityId> = stored.iter().copied().collect();
    assert_eq!(stored.len(), targets.len());
    assert_eq!(unique, targets.iter().map(|t| t.id).collect::<HashSet<_>>());
}

async fn documents<S: StorageBackend>(storage: &S) {
    let mut table = entity(EntityKind::Table, "mysql.shop.orders", 0.1);
    table.owner = Some(EntityReference::new(EntityId::new(), EntityKind::User));
    table.tags = Some(vec!["PII.Sensitive".into()]);

    storage
        .commit(WriteBatch::new().with(WriteOp::PutEntity(table.clone())))
        .await
        .unwrap();

    let stored = storage.get_entity(&table.id).await.unwrap().unwrap();
    assert!(stored.owner.is_none(), "relationship fields are not persisted");
    assert_eq!(stored.tags, table.tags);

    let by_name = storage
        .get_entity_by_fqn(EntityKind::Table, "mysql.shop.orders")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name.id, table.id);
    assert!(storage
        .get_entity_by_fqn(EntityKind::Topic, "mysql.shop.orders")
        .await
        .unwrap()
        .is_none());

    let tables = storage.list_entities(EntityKind::Table).await.unwrap();
    assert_eq!(tables.len(), 1);

    storage
        .commit(WriteBatch::new().with(WriteOp::DeleteEntity { id: table.id }))
        .await
        .unwrap();
    assert!(storage.get_entity(&table.id).await.unwrap().is_none());
    assert!(storage
        .get_entity_by_fqn(EntityKind::Table, "mysql.shop.orders")
        .await
        .unwrap()
        .is_none());
}

async fn duplicate_fqn_aborts_batch<S: StorageBackend>(storage: &S) {
    let first = entity(EntityKind::Pipeline, "airflow.etl", 0.1);
    storage
        .commit(WriteBatch::new().with(WriteOp::PutEntity(first.clone())))
        .await
        .unwrap();

    let other = entity(EntityKind::Pipeline, "airflow.other", 0.1);
    let clash = entity(EntityKind::Pipeline, "airflow.etl", 0.1);
    let err = storage
        .commit(
            WriteBatch::new()
                .with(WriteOp::PutEntity(other.clone()))
                .with(WriteOp::PutEntity(clash)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateEntity { .. }));
    assert!(storage.get_entity(&other.id).await.unwrap().is_none());

    // Same id, same FQN is an overwrite
    let mut updated = first.clone();
    updated.description = Some("daily load".into());
    storage
        .commit(WriteBatch::new().with(WriteOp::PutEntity(updated)))
        .await
        .unwrap();
    let stored = storage.get_entity(&first.id).await.unwrap().unwrap();
    assert_eq!(stored.description.as_deref(), Some("daily load"));
}

async fn history<S: StorageBackend>(storage: &S) {
    let mut topic = entity(EntityKind::Topic, "kafka.orders", 0.1);
    let mut batch = WriteBatch::new();
    for version in [0.1, 0.2, 1.0, 10.0, 1.1] {
        topic.version = version;
        batch.push(WriteOp::PutVersion(topic.clone()));
    }
    storage.commit(batch).await.unwrap();

    let versions: Vec<f64> = storage
        .list_versions(&topic.id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.version)
        .collect();
    assert_eq!(versions, vec![0.1, 0.2, 1.0, 1.1, 10.0]);

    let one = storage.get_version(&topic.id, 1.1).await.unwrap().unwrap();
    assert_eq!(one.version, 1.1);
    for between in [0.15, 0.19, 1.05] {
        assert!(
            storage.get_version(&topic.id, between).await.unwrap().is_none(),
            "{} names no stored version",
            between
        );
    }
    assert!(storage.get_version(&topic.id, 3.0).await.unwrap().is_none());
    assert!(storage.list_versions(&EntityId::new()).await.unwrap().is_empty());
}

async fn version_precondition<S: StorageBackend>(storage: &S) {
    let chart = entity(EntityKind::Chart, "superset.revenue", 0.2);
    storage
        .commit(WriteBatch::new().with(WriteOp::PutEntity(chart.clone())))
        .await
        .unwrap();

    let mut stale = chart.clone();
    stale.description = Some("stale".into());
    let err = storage
        .commit(
            WriteBatch::new()
                .expect_version(chart.id, 0.1)
                .with(WriteOp::PutEntity(stale)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));

    let err = storage
        .commit(WriteBatch::new().expect_version(EntityId::new(), 0.1))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::EntityNotFound(_)));

    storage
        .commit(WriteBatch::new().expect_version(chart.id, 0.2))
        .await
        .unwrap();
}

async fn edges<S: StorageBackend>(storage: &S) {
    let pipeline = entity(EntityKind::Pipeline, "airflow.load", 0.1);
    let tasks: Vec<Entity> = (0..3)
        .map(|i| entity(EntityKind::Task, &format!("airflow.task_{}", i), 0.1))
        .collect();
    let owner = entity(EntityKind::Team, "data", 0.1);

    for _ in 0..3 {
        for task in tasks.iter().rev() {
            storage.insert_edge(&contains(&pipeline, task)).await.unwrap();
        }
    }
    assert!(!storage.insert_edge(&contains(&pipeline, &tasks[0])).await.unwrap());
    let owns = Relation::new(owner.id, owner.entity_type, pipeline.id, pipeline.entity_type, Relationship::Owns);
    assert!(storage.insert_edge(&owns).await.unwrap());

    let ids = storage
        .find_to(&pipeline.id, Relationship::Contains, None)
        .await
        .unwrap();
    assert_eq!(ids, vec![tasks[2].id, tasks[1].id, tasks[0].id]);
    assert!(storage
        .find_to(&pipeline.id, Relationship::Contains, Some(EntityKind::Chart))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        storage.find_from(&tasks[1].id, Relationship::Contains, None).await.unwrap(),
        vec![pipeline.id]
    );
    assert_eq!(
        storage
            .count_to(&pipeline.id, Relationship::Contains, Some(EntityKind::Task))
            .await
            .unwrap(),
        3
    );
    assert_eq!(
        storage.find_from(&pipeline.id, Relationship::Owns, None).await.unwrap(),
        vec![owner.id]
    );
    assert!(storage
        .find_to(&EntityId::new(), Relationship::Lineage, None)
        .await
        .unwrap()
        .is_empty());

    assert!(storage.delete_edge(&contains(&pipeline, &tasks[1])).await.unwrap());
    assert!(!storage.delete_edge(&contains(&pipeline, &tasks[1])).await.unwrap());

    let selector = EdgeSelector::new(pipeline.id, Relationship::Contains, Direction::Outgoing)
        .with_peer_type(EntityKind::Task);
    assert_eq!(storage.delete_by_direction(&selector).await.unwrap(), 2);
    assert_eq!(
        storage.count_from(&pipeline.id, Relationship::Owns, None).await.unwrap(),
        1,
        "other relations are untouched"
    );

    storage.insert_edge(&contains(&pipeline, &tasks[0])).await.unwrap();
    assert_eq!(storage.delete_all(&pipeline.id).await.unwrap(), 2);
    assert!(storage.find_edges(&selector).await.unwrap().is_empty());
}

async fn failed_batch_keeps_edges<S: StorageBackend>(storage: &S) {
    let dashboard = entity(EntityKind::Dashboard, "looker.sales", 0.1);
    let charts: Vec<Entity> = (0..2)
        .map(|i| entity(EntityKind::Chart, &format!("looker.chart_{}", i), 0.1))
        .collect();
    storage.insert_edge(&contains(&dashboard, &charts[0])).await.unwrap();

    let taken = entity(EntityKind::Dashboard, "looker.taken", 0.1);
    storage
        .commit(WriteBatch::new().with(WriteOp::PutEntity(taken)))
        .await
        .unwrap();

    let err = storage
        .commit(
            WriteBatch::new()
                .with(WriteOp::DeleteEdge(contains(&dashboard, &charts[0])))
                .with(WriteOp::InsertEdge(contains(&dashboard, &charts[1])))
                .with(WriteOp::PutEntity(entity(EntityKind::Dashboard, "looker.taken", 0.1))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::DuplicateEntity { .. }));
    assert_eq!(
        storage
            .find_to(&dashboard.id, Relationship::Contains, None)
            .await
            .unwrap(),
        vec![charts[0].id]
    );
}

async fn dependents_precondition<S: StorageBackend>(storage: &S) {
    let service = entity(EntityKind::PipelineService, "dagster", 0.1);
    let pipeline = entity(EntityKind::Pipeline, "dagster.nightly", 0.1);
    storage
        .commit(
            WriteBatch::new()
                .with(WriteOp::PutEntity(service.clone()))
                .with(WriteOp::InsertEdge(contains(&service, &pipeline))),
        )
        .await
        .unwrap();

    let selector = EdgeSelector::new(service.id, Relationship::Contains, Direction::Outgoing);
    let err = storage
        .commit(
            WriteBatch::new()
                .expect_no_dependents(EntityKind::PipelineService, selector.clone())
                .with(WriteOp::DeleteAllEdges(service.id))
                .with(WriteOp::DeleteEntity { id: service.id }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::HasDependents { count: 1, .. }));
    assert_eq!(storage.find_edges(&selector).await.unwrap().len(), 1);
    assert!(storage.get_entity(&service.id).await.unwrap().is_some());
}
