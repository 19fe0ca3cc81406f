//! Tessera Catalog - Orchestration layer of the metadata catalog
//!
//! [`Catalog`] ties the pure pieces of `tessera-core` (version engine,
//! cursor pager, field selectors) to a `tessera-storage` backend, and
//! [`LineageEngine`] answers bounded-depth lineage queries over the graph.

pub mod catalog;
pub mod lineage;

pub use catalog::{Catalog, EntityHistory, FollowOutcome};
pub use lineage::LineageEngine;
