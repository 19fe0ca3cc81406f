//! Schema versioning shared by the persistent backends
//!
//! Each backend records the schema version it last wrote. Opening a store
//! replays every step between that version and [`CURRENT_VERSION`]; a store
//! written by a newer build is refused rather than read with the wrong layout.

use crate::{StorageError, StorageResult};

/// Schema version this build reads and writes
pub const CURRENT_VERSION: u32 = 1;

/// One step in the schema history
#[derive(Debug, Clone, Copy)]
pub struct SchemaVersion {
    pub version: u32,
    pub description: &'static str,
}

const SCHEMA_HISTORY: &[SchemaVersion] = &[SchemaVersion {
    version: 1,
    description: "Current documents with FQN index, version history, and edge store",
}];

/// Every schema step, oldest first
pub fn get_migrations() -> &'static [SchemaVersion] {
    SCHEMA_HISTORY
}

fn describe(version: u32) -> &'static str {
    SCHEMA_HISTORY
        .iter()
        .find(|s| s.version == version)
        .map(|s| s.description)
        .unwrap_or("unknown step")
}

/// Implemented by backends that persist a schema version
pub trait Migratable {
    /// Stored schema version; 0 for a fresh store
    fn get_schema_version(&self) -> StorageResult<u32>;

    fn set_schema_version(&self, version: u32) -> StorageResult<()>;

    /// Apply the layout changes introduced by `version`
    fn run_migration(&self, version: u32) -> StorageResult<()>;

    fn migrate_to(&self, target_version: u32) -> StorageResult<()> {
        let current = self.get_schema_version()?;

        if current > target_version {
            return Err(StorageError::Migration(format!(
                "store has schema version {}, this build supports up to {}",
                current, target_version
            )));
        }
        if current == target_version {
            tracing::debug!("Schema already at version {}", target_version);
            return Ok(());
        }

        for version in (current + 1)..=target_version {
            tracing::info!("Applying schema v{}: {}", version, describe(version));
            self.run_migration(version)?;
            self.set_schema_version(version)?;
        }
        Ok(())
    }

    fn migrate_to_latest(&self) -> StorageResult<()> {
        self.migrate_to(CURRENT_VERSION)
    }
}
