//! Output formatting utilities

use serde::Serialize;
use tessera_core::{Entity, EntityId, EntityLineage, Paging, VersionOutcome};

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// One entity with its relationship fields
pub fn print_entity(entity: &Entity, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(&entity.to_json()?);
    }

    println!("{} ({})", entity.fully_qualified_name, entity.entity_type);
    println!("  Id: {}", entity.id);
    println!("  Version: {}", entity.version);
    println!("  Updated: {} by {}", entity.updated_at, entity.updated_by);
    if entity.deleted {
        println!("  Deactivated");
    }
    if let Some(display_name) = &entity.display_name {
        println!("  Display name: {}", display_name);
    }
    if let Some(description) = &entity.description {
        println!("  Description: {}", description);
    }
    if let Some(container) = &entity.container {
        println!("  Container: {} ({})", container.name, container.entity_type);
    }
    if let Some(owner) = &entity.owner {
        println!("  Owner: {} ({})", owner.name, owner.entity_type);
    }
    if let Some(tags) = entity.tags.as_ref().filter(|t| !t.is_empty()) {
        println!("  Tags: {}", tags.join(", "));
    }
    let lists = [
        ("Followers", &entity.followers),
        (
            entity.entity_type.config().child_field().unwrap_or("children"),
            &entity.children,
        ),
        ("Owns", &entity.owns),
        ("Teams", &entity.teams),
        ("Follows", &entity.follows),
    ];
    for (label, references) in lists {
        if let Some(references) = references {
            println!("  {}: {}", label, references.len());
            for reference in references {
                println!("    - {} ({})", reference.name, reference.entity_type);
            }
        }
    }
    for (key, value) in &entity.attributes {
        println!("  {}: {}", key, value);
    }
    Ok(())
}

/// A page of entities plus the cursors to continue from
pub fn print_page(entities: &[Entity], paging: &Paging, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let data = entities
            .iter()
            .map(Entity::to_json)
            .collect::<Result<Vec<_>, _>>()?;
        return print_json(&serde_json::json!({ "data": data, "paging": paging }));
    }

    if entities.is_empty() {
        println!("No entities found");
    } else {
        let width = entities
            .iter()
            .map(|e| e.fully_qualified_name.len())
            .max()
            .unwrap_or(0)
            .max(4);
        println!("{:<width$}  {:>7}  DESCRIPTION", "NAME", "VERSION", width = width);
        for entity in entities {
            println!(
                "{:<width$}  {:>7}  {}",
                entity.fully_qualified_name,
                entity.version,
                entity.description.as_deref().unwrap_or(""),
                width = width
            );
        }
    }
    println!();
    println!("{} of {} total", entities.len(), paging.total);
    if let Some(before) = &paging.before {
        println!("Previous page: --before {}", before);
    }
    if let Some(after) = &paging.after {
        println!("Next page: --after {}", after);
    }
    Ok(())
}

/// Result of a create, update or patch
pub fn print_outcome(outcome: &VersionOutcome, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let mut value = outcome.entity.to_json()?;
        if let Some(object) = value.as_object_mut() {
            object.insert("versionDelta".to_string(), serde_json::to_value(outcome.delta)?);
        }
        return print_json(&value);
    }

    let entity = &outcome.entity;
    println!(
        "{:?}: {} ({}) {} -> {}",
        outcome.delta.update_type,
        entity.fully_qualified_name,
        entity.entity_type,
        outcome.delta.previous_version,
        outcome.delta.current_version
    );
    if let Some(change) = &entity.change_description {
        for (label, fields) in [
            ("added", &change.fields_added),
            ("updated", &change.fields_updated),
            ("deleted", &change.fields_deleted),
        ] {
            if !fields.is_empty() {
                println!("  {}: {}", label, fields.join(", "));
            }
        }
    }
    Ok(())
}

pub fn print_lineage(lineage: &EntityLineage, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(lineage);
    }

    let name = |id: EntityId| {
        lineage
            .nodes
            .iter()
            .chain(std::iter::once(&lineage.entity))
            .find(|n| n.id == id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    };

    println!("Lineage of {} ({})", lineage.entity.name, lineage.entity.entity_type);
    for (label, edges) in [
        ("Upstream", &lineage.upstream_edges),
        ("Downstream", &lineage.downstream_edges),
    ] {
        println!("  {} edges: {}", label, edges.len());
        for edge in edges {
            println!("    {} -> {}", name(edge.from_entity), name(edge.to_entity));
        }
    }
    Ok(())
}
