//! Tessera Storage - Storage backends for the metadata catalog
//!
//! This crate provides the [`EntityStore`] and [`RelationshipGraph`]
//! abstractions and the backends that implement them. Writes that must be
//! atomic are expressed as a [`WriteBatch`] and applied with
//! [`StorageBackend::commit`].

#![allow(clippy::result_large_err)]

pub mod batch;
pub mod error;
pub mod migration;
pub mod traits;

#[cfg(feature = "redb")]
pub mod redb;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod memory;

#[cfg(test)]
mod conformance;

pub use batch::{CommitSummary, Precondition, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use migration::{Migratable, SchemaVersion, CURRENT_VERSION};
pub use traits::{EntityStore, RelationshipGraph, StorageBackend};

#[cfg(feature = "redb")]
pub use redb::RedbStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStorage;

pub use memory::MemoryStorage;
