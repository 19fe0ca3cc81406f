//! SQLite storage backend

use crate::batch::{CommitSummary, Precondition, WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use crate::migration::Migratable;
use crate::traits::{EntityStore, RelationshipGraph, StorageBackend};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tessera_core::{
    version_tenths, Direction, EdgeSelector, Entity, EntityId, EntityKind, Relation, Relationship,
};

const EDGE_COLUMNS: &str = "from_id, from_kind, to_id, to_kind, relation";

fn tenths(version: f64) -> i64 {
    version_tenths(version).unwrap_or_else(|| (version * 10.0).round() as i64)
}

fn corrupt(key: &str, reason: impl ToString) -> StorageError {
    StorageError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_edge(columns: [String; 5]) -> StorageResult<Relation> {
    let [from_id, from_kind, to_id, to_kind, relation] = columns;
    let key = format!("{}|{}|{}", from_id, relation, to_id);
    Ok(Relation {
        from_id: EntityId::from_string(&from_id).map_err(|e| corrupt(&key, e))?,
        from_type: from_kind.parse::<EntityKind>().map_err(|e| corrupt(&key, e))?,
        to_id: EntityId::from_string(&to_id).map_err(|e| corrupt(&key, e))?,
        to_type: to_kind.parse::<EntityKind>().map_err(|e| corrupt(&key, e))?,
        relation: relation.parse::<Relationship>().map_err(|e| corrupt(&key, e))?,
    })
}

/// WHERE clause selecting the edges of one anchor/relation/peer-type triple
fn selector_clause(selector: &EdgeSelector) -> &'static str {
    match selector.direction {
        Direction::Outgoing => "from_id = ?1 AND relation = ?2 AND (?3 IS NULL OR to_kind = ?3)",
        Direction::Incoming => "to_id = ?1 AND relation = ?2 AND (?3 IS NULL OR from_kind = ?3)",
    }
}

fn find_edges(conn: &Connection, selector: &EdgeSelector) -> StorageResult<Vec<Relation>> {
    let sql = format!(
        "SELECT {} FROM edges WHERE {} ORDER BY seq",
        EDGE_COLUMNS,
        selector_clause(selector)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            selector.entity_id.to_string(),
            selector.relation.as_str(),
            selector.peer_type.map(|k| k.as_str())
        ],
        |row| -> rusqlite::Result<[String; 5]> {
            Ok([row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?])
        },
    )?;

    let mut edges = Vec::new();
    for row in rows {
        edges.push(parse_edge(row?)?);
    }
    Ok(edges)
}

fn check(conn: &Connection, precondition: &Precondition) -> StorageResult<()> {
    match precondition {
        Precondition::Version { id, version } => {
            let actual: Option<f64> = conn
                .query_row(
                    "SELECT version FROM entities WHERE id = ?1",
                    params![id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            match actual {
                None => return Err(StorageError::EntityNotFound(id.to_string())),
                Some(actual) if actual != *version => {
                    return Err(StorageError::Conflict {
                        id: id.to_string(),
                        expected: *version,
                        actual,
                    })
                }
                Some(_) => {}
            }
        }
        Precondition::NoDependents {
            entity_type,
            selector,
        } => {
            let count = find_edges(conn, selector)?.len();
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

fn apply(conn: &Connection, op: WriteOp, summary: &mut CommitSummary) -> StorageResult<()> {
    match op {
        WriteOp::PutEntity(entity) => {
            let id = entity.id.to_string();
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM entities WHERE kind = ?1 AND fqn = ?2",
                    params![entity.entity_type.as_str(), entity.fully_qualified_name],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some_and(|existing| existing != id) {
                return Err(StorageError::DuplicateEntity {
                    entity_type: entity.entity_type.to_string(),
                    fqn: entity.fully_qualified_name.clone(),
                });
            }
            let data = serde_json::to_string(&entity.to_stored())?;
            conn.execute(
                "INSERT OR REPLACE INTO entities (id, kind, fqn, version, data) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    entity.entity_type.as_str(),
                    entity.fully_qualified_name,
                    entity.version,
                    data
                ],
            )?;
        }
        WriteOp::PutVersion(entity) => {
            let data = serde_json::to_string(&entity.to_stored())?;
            conn.execute(
                "INSERT OR REPLACE INTO entity_versions (id, version_tenths, data) VALUES (?1, ?2, ?3)",
                params![entity.id.to_string(), tenths(entity.version), data],
            )?;
        }
        WriteOp::DeleteEntity { id } => {
            conn.execute("DELETE FROM entities WHERE id = ?1", params![id.to_string()])?;
        }
        WriteOp::InsertEdge(edge) => {
            summary.edges_inserted += conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO edges ({}) VALUES (?1, ?2, ?3, ?4, ?5)",
                    EDGE_COLUMNS
                ),
                params![
                    edge.from_id.to_string(),
                    edge.from_type.as_str(),
                    edge.to_id.to_string(),
                    edge.to_type.as_str(),
                    edge.relation.as_str()
                ],
            )?;
        }
        WriteOp::DeleteEdge(edge) => {
            summary.edges_deleted += conn.execute(
                "DELETE FROM edges WHERE from_id = ?1 AND from_kind = ?2 AND to_id = ?3 AND to_kind = ?4 AND relation = ?5",
                params![
                    edge.from_id.to_string(),
                    edge.from_type.as_str(),
                    edge.to_id.to_string(),
                    edge.to_type.as_str(),
                    edge.relation.as_str()
                ],
            )?;
        }
        WriteOp::DeleteEdges(selector) => {
            summary.edges_deleted += conn.execute(
                &format!("DELETE FROM edges WHERE {}", selector_clause(&selector)),
                params![
                    selector.entity_id.to_string(),
                    selector.relation.as_str(),
                    selector.peer_type.map(|k| k.as_str())
                ],
            )?;
        }
        WriteOp::DeleteAllEdges(id) => {
            summary.edges_deleted += conn.execute(
                "DELETE FROM edges WHERE from_id = ?1 OR to_id = ?1",
                params![id.to_string()],
            )?;
        }
    }
    Ok(())
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(|e| StorageError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::Database(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.migrate_to_latest()?;
        Ok(storage)
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }

    fn commit_sync(&self, batch: WriteBatch) -> StorageResult<CommitSummary> {
        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls it back
        let tx = conn.transaction()?;
        for precondition in &batch.preconditions {
            check(&tx, precondition)?;
        }
        let mut summary = CommitSummary::default();
        for op in batch.ops {
            apply(&tx, op, &mut summary)?;
        }
        tx.commit()?;
        Ok(summary)
    }

    fn query_documents(&self, sql: &str, key: &str) -> StorageResult<Vec<Entity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![key], |row| row.get::<_, String>(0))?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(serde_json::from_str(&row?)?);
        }
        Ok(entities)
    }
}

impl Migratable for SqliteStorage {
    fn get_schema_version(&self) -> StorageResult<u32> {
        let conn = self.lock()?;
        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version)
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(&format!("PRAGMA user_version = {}", version))?;
        Ok(())
    }

    fn run_migration(&self, version: u32) -> StorageResult<()> {
        let conn = self.lock()?;
        match version {
            1 => conn
                .execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS entities (
                        id TEXT PRIMARY KEY,
                        kind TEXT NOT NULL,
                        fqn TEXT NOT NULL,
                        version REAL NOT NULL,
                        data TEXT NOT NULL,
                        UNIQUE (kind, fqn)
                    );

                    CREATE TABLE IF NOT EXISTS entity_versions (
                        id TEXT NOT NULL,
                        version_tenths INTEGER NOT NULL,
                        data TEXT NOT NULL,
                        PRIMARY KEY (id, version_tenths)
                    );

                    CREATE TABLE IF NOT EXISTS edges (
                        seq INTEGER PRIMARY KEY AUTOINCREMENT,
                        from_id TEXT NOT NULL,
                        from_kind TEXT NOT NULL,
                        to_id TEXT NOT NULL,
                        to_kind TEXT NOT NULL,
                        relation TEXT NOT NULL,
                        UNIQUE (from_id, from_kind, to_id, to_kind, relation)
                    );

                    CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id, relation);
                    CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id, relation);
                    "#,
                )
                .map_err(|e| StorageError::Migration(e.to_string())),
            other => Err(StorageError::Migration(format!("Unknown schema version {}", other))),
        }
    }
}

#[async_trait]
impl EntityStore for SqliteStorage {
    async fn get_entity(&self, id: &EntityId) -> StorageResult<Option<Entity>> {
        let docs = self.query_documents("SELECT data FROM entities WHERE id = ?1", &id.to_string())?;
        Ok(docs.into_iter().next())
    }

    async fn get_entity_by_fqn(&self, kind: EntityKind, fqn: &str) -> StorageResult<Option<Entity>> {
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM entities WHERE kind = ?1 AND fqn = ?2",
                params![kind.as_str(), fqn],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn list_entities(&self, kind: EntityKind) -> StorageResult<Vec<Entity>> {
        self.query_documents("SELECT data FROM entities WHERE kind = ?1", kind.as_str())
    }

    async fn get_version(&self, id: &EntityId, version: f64) -> StorageResult<Option<Entity>> {
        let Some(tenths) = version_tenths(version) else {
            return Ok(None);
        };
        let conn = self.lock()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM entity_versions WHERE id = ?1 AND version_tenths = ?2",
                params![id.to_string(), tenths],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn list_versions(&self, id: &EntityId) -> StorageResult<Vec<Entity>> {
        self.query_documents(
            "SELECT data FROM entity_versions WHERE id = ?1 ORDER BY version_tenths",
            &id.to_string(),
        )
    }
}

#[async_trait]
impl RelationshipGraph for SqliteStorage {
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
        let conn = self.lock()?;
        find_edges(&conn, selector)
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let conn = self.lock()?;
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(one == 1)
    }

    async fn commit(&self, batch: WriteBatch) -> StorageResult<CommitSummary> {
        let ops = batch.ops.len();
        let summary = self.commit_sync(batch)?;
        tracing::debug!("Committed {} op(s) in single transaction", ops);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use crate::migration::CURRENT_VERSION;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sqlite_storage() {
        let storage = SqliteStorage::in_memory().unwrap();
        conformance::run_all(&storage).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sqlite_concurrent_edge_inserts() {
        let storage = SqliteStorage::in_memory().unwrap();
        conformance::concurrent_edge_inserts(std::sync::Arc::new(storage)).await;
    }

    #[tokio::test]
    async fn test_sqlite_file_is_migrated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.db");

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.get_schema_version().unwrap(), CURRENT_VERSION);
        drop(storage);

        let reopened = SqliteStorage::open(&path).unwrap();
        assert_eq!(reopened.get_schema_version().unwrap(), CURRENT_VERSION);
        assert!(reopened.health_check().await.unwrap());
    }
}
