//! Storage error types

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage-specific error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Duplicate entity: {entity_type} {fqn}")]
    DuplicateEntity { entity_type: String, fqn: String },

    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    Conflict { id: String, expected: f64, actual: f64 },

    #[error("{entity_type} {id} has {count} dependent {relation} edge(s)")]
    HasDependents {
        entity_type: String,
        id: String,
        relation: String,
        count: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[cfg(feature = "redb")]
    #[error("ReDB error: {0}")]
    Redb(#[from] ::redb::Error),

    #[cfg(feature = "redb")]
    #[error("ReDB database error: {0}")]
    RedbDatabase(#[from] ::redb::DatabaseError),

    #[cfg(feature = "redb")]
    #[error("ReDB table error: {0}")]
    RedbTable(#[from] ::redb::TableError),

    #[cfg(feature = "redb")]
    #[error("ReDB storage error: {0}")]
    RedbStorage(#[from] ::redb::StorageError),

    #[cfg(feature = "redb")]
    #[error("ReDB commit error: {0}")]
    RedbCommit(#[from] ::redb::CommitError),

    #[cfg(feature = "redb")]
    #[error("ReDB transaction error: {0}")]
    RedbTransaction(#[from] ::redb::TransactionError),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] ::rusqlite::Error),
}

impl From<StorageError> for tessera_core::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict {
                id,
                expected,
                actual,
            } => Self::ConcurrentModificationConflict {
                id,
                expected,
                actual,
            },
            StorageError::DuplicateEntity { entity_type, fqn } => {
                Self::EntityAlreadyExists { entity_type, fqn }
            }
            StorageError::HasDependents {
                entity_type,
                id,
                relation,
                count,
            } => Self::DependentEntitiesExist {
                entity_type,
                id,
                relation,
                count,
            },
            StorageError::EntityNotFound(key) => Self::EntityNotFound {
                entity_type: "entity".to_string(),
                key,
            },
            StorageError::Serialization(e) => Self::Serialization(e),
            other => Self::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::ErrorKind;

    #[test]
    fn test_precondition_failures_map_to_taxonomy() {
        let conflict: tessera_core::Error = StorageError::Conflict {
            id: "a".into(),
            expected: 0.1,
            actual: 0.2,
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::ConcurrentModificationConflict);

        let duplicate: tessera_core::Error = StorageError::DuplicateEntity {
            entity_type: "table".into(),
            fqn: "mysql.shop.orders".into(),
        }
        .into();
        assert_eq!(duplicate.kind(), ErrorKind::EntityAlreadyExists);

        let io: tessera_core::Error = StorageError::Database("disk full".into()).into();
        assert_eq!(io.kind(), ErrorKind::Storage);
    }
}
