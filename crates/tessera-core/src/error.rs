//! Error types for Tessera Core

use thiserror::Error;

/// Result type alias using Tessera's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Tessera error types
///
/// Every variant carries the identifiers needed to explain the failure to a
/// caller. Use [`Error::kind`] to map a failure onto a transport status.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Entity not found: {entity_type} {key}")]
    EntityNotFound { entity_type: String, key: String },

    #[error("Entity already exists: {entity_type} {fqn}")]
    EntityAlreadyExists { entity_type: String, fqn: String },

    #[error("Entity {entity_type} attribute {field} can't be modified")]
    ReadOnlyFieldViolation { entity_type: String, field: String },

    #[error("Malformed patch: {0}")]
    MalformedPatch(String),

    #[error("Invalid limit {limit}: must be between {min} and {max}")]
    InvalidLimit { limit: i64, min: i64, max: i64 },

    #[error("Only one of before or after cursor allowed")]
    AmbiguousCursor,

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid {direction} depth {depth}: must not be negative")]
    InvalidDepth { direction: &'static str, depth: i32 },

    #[error("{entity_type} {id} is not empty: {count} dependent {relation} relationship(s)")]
    DependentEntitiesExist {
        entity_type: String,
        id: String,
        relation: String,
        count: usize,
    },

    #[error("Concurrent modification of {id}: expected version {expected}, found {actual}")]
    ConcurrentModificationConflict {
        id: String,
        expected: f64,
        actual: f64,
    },

    #[error("Invalid entity name: {0}")]
    InvalidEntityName(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stable discriminant of an [`Error`], independent of its message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EntityNotFound,
    EntityAlreadyExists,
    ReadOnlyFieldViolation,
    MalformedPatch,
    InvalidLimit,
    AmbiguousCursor,
    InvalidCursor,
    InvalidDepth,
    DependentEntitiesExist,
    ConcurrentModificationConflict,
    InvalidEntityName,
    Validation,
    Storage,
    Serialization,
}

impl Error {
    pub fn not_found(entity_type: impl Into<String>, key: impl ToString) -> Self {
        Self::EntityNotFound {
            entity_type: entity_type.into(),
            key: key.to_string(),
        }
    }

    pub fn already_exists(entity_type: impl Into<String>, fqn: impl Into<String>) -> Self {
        Self::EntityAlreadyExists {
            entity_type: entity_type.into(),
            fqn: fqn.into(),
        }
    }

    pub fn read_only(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ReadOnlyFieldViolation {
            entity_type: entity_type.into(),
            field: field.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EntityNotFound { .. } => ErrorKind::EntityNotFound,
            Self::EntityAlreadyExists { .. } => ErrorKind::EntityAlreadyExists,
            Self::ReadOnlyFieldViolation { .. } => ErrorKind::ReadOnlyFieldViolation,
            Self::MalformedPatch(_) => ErrorKind::MalformedPatch,
            Self::InvalidLimit { .. } => ErrorKind::InvalidLimit,
            Self::AmbiguousCursor => ErrorKind::AmbiguousCursor,
            Self::InvalidCursor(_) => ErrorKind::InvalidCursor,
            Self::InvalidDepth { .. } => ErrorKind::InvalidDepth,
            Self::DependentEntitiesExist { .. } => ErrorKind::DependentEntitiesExist,
            Self::ConcurrentModificationConflict { .. } => {
                ErrorKind::ConcurrentModificationConflict
            }
            Self::InvalidEntityName(_) => ErrorKind::InvalidEntityName,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Whether the caller can resolve the failure and retry the request
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DependentEntitiesExist | ErrorKind::ConcurrentModificationConflict
        )
    }
}
