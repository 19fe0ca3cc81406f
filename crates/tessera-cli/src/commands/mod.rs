//! CLI command implementations

use std::str::FromStr;

use tessera_core::{Entity, EntityKind, ErrorKind, FieldSet};

use crate::AppContext;

pub mod completions;
pub mod config;
pub mod entity;
pub mod lineage;
pub mod relation;

/// `kind:fqn` address of an entity, e.g. `table:mysql.shop.orders`
#[derive(Debug, Clone)]
pub struct EntityPath {
    pub kind: EntityKind,
    pub fqn: String,
}

impl FromStr for EntityPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, fqn) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <type>:<name>, got {}", s))?;
        if fqn.is_empty() {
            return Err(format!("missing name in {}", s));
        }
        Ok(Self {
            kind: kind.parse().map_err(|e: tessera_core::Error| e.to_string())?,
            fqn: fqn.to_string(),
        })
    }
}

pub async fn lookup(ctx: &AppContext, path: &EntityPath, fields: &FieldSet) -> anyhow::Result<Entity> {
    Ok(ctx.catalog.get_by_name(path.kind, &path.fqn, fields).await?)
}

/// Find an entity by FQN among several candidate kinds
pub async fn lookup_any(ctx: &AppContext, kinds: &[EntityKind], fqn: &str) -> anyhow::Result<Entity> {
    for kind in kinds {
        match ctx.catalog.get_by_name(*kind, fqn, &FieldSet::none()).await {
            Ok(entity) => return Ok(entity),
            Err(e) if e.kind() == ErrorKind::EntityNotFound => continue,
            Err(e) => return Err(e.into()),
        }
    }
    let kinds: Vec<_> = kinds.iter().map(EntityKind::as_str).collect();
    anyhow::bail!("No {} named {}", kinds.join(" or "), fqn)
}

/// Parse a `--fields` selector; `*` selects every field the kind supports
pub fn field_set(kind: EntityKind, spec: Option<&str>) -> anyhow::Result<FieldSet> {
    Ok(match spec {
        None => FieldSet::none(),
        Some("*") => FieldSet::all_for(kind),
        Some(spec) => FieldSet::parse(kind, spec)?,
    })
}
