//! Tessera Core - Data model and versioning engine for the metadata catalog
//!
//! This crate provides the entity model, the per-kind configuration tables,
//! the version engine, JSON patch application and cursor pagination. It
//! performs no I/O; storage lives in `tessera-storage`.

pub mod cursor;
pub mod entity;
pub mod error;
pub mod fields;
pub mod kind;
pub mod limits;
pub mod lineage;
pub mod patch;
pub mod query;
pub mod relation;
pub mod version;

pub use cursor::{Cursor, CursorDirection};
pub use entity::{Entity, EntityId, EntityReference, NewEntity};
pub use error::{Error, ErrorKind, Result};
pub use fields::{Field, FieldSet};
pub use kind::{ChildMerge, ChildSpec, EntityKind, KindConfig};
pub use lineage::{EntityLineage, LineageEdge, LineageQuery, LineageStats};
pub use patch::{Patch, PatchOperation};
pub use query::{CursorPager, ListFilter, PageRequest, Paging, ResultList};
pub use relation::{Direction, EdgeSelector, Relation, Relationship};
pub use version::{
    version_tenths, ChangeDescription, UpdateType, VersionDelta, VersionEngine, VersionOutcome, INITIAL_VERSION,
};
