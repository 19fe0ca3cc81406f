//! Entity commands

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};
use serde_json::Value;

use super::{field_set, lookup_any, EntityPath};
use crate::output::{print_entity, print_json, print_outcome, print_page, OutputFormat};
use crate::AppContext;
use tessera_core::{Entity, EntityKind, FieldSet, ListFilter, NewEntity, PageRequest, Patch};

#[derive(Args)]
pub struct EntityArgs {
    #[command(subcommand)]
    pub command: EntityCommands,
}

#[derive(Subcommand)]
pub enum EntityCommands {
    /// Create a new entity
    Create {
        /// Entity type (databaseService, database, table, pipeline, user, team, ...)
        kind: EntityKind,
        /// Entity name, unique within its container
        name: String,
        /// FQN of the containing service or namespace
        #[arg(long = "in")]
        container: Option<String>,
        /// Human readable name
        #[arg(long)]
        display_name: Option<String>,
        /// Description
        #[arg(long)]
        description: Option<String>,
        /// Owning user or team
        #[arg(short, long)]
        owner: Option<String>,
        /// Tags
        #[arg(short, long)]
        tag: Vec<String>,
        /// FQN of a child entity (team members, ...)
        #[arg(short, long)]
        child: Vec<String>,
        /// Team a new user joins
        #[arg(long)]
        team: Vec<String>,
        /// Extra attribute as key=value; the value is parsed as JSON when possible
        #[arg(short, long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, Value)>,
        /// Update the entity in place if it already exists
        #[arg(long)]
        upsert: bool,
    },
    /// Get entity details
    Get {
        kind: EntityKind,
        /// Fully qualified name
        fqn: String,
        /// Relationship fields to include (comma-separated, `*` for all)
        #[arg(long)]
        fields: Option<String>,
    },
    /// List entities of one type, ordered by FQN
    List {
        kind: EntityKind,
        /// Only entities inside this container FQN
        #[arg(long = "in")]
        container: Option<String>,
        /// Page size
        #[arg(short, long)]
        limit: Option<i64>,
        /// Cursor of the page to continue after
        #[arg(long, conflicts_with = "before")]
        after: Option<String>,
        /// Cursor of the page to go back from
        #[arg(long)]
        before: Option<String>,
        /// Relationship fields to include (comma-separated, `*` for all)
        #[arg(long)]
        fields: Option<String>,
    },
    /// Apply a JSON patch (RFC 6902) to an entity
    Patch {
        kind: EntityKind,
        fqn: String,
        /// Patch document as inline JSON
        #[arg(long, conflicts_with = "file")]
        patch: Option<String>,
        /// Read the patch document from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Replace an entity with a full JSON document
    Replace {
        kind: EntityKind,
        fqn: String,
        /// JSON document, as printed by `entity get --format json`
        #[arg(long)]
        file: PathBuf,
    },
    /// Delete an entity (users are deactivated instead)
    Delete {
        kind: EntityKind,
        fqn: String,
        /// Confirm the deletion
        #[arg(long)]
        force: bool,
    },
    /// Show the version history of an entity
    History {
        kind: EntityKind,
        fqn: String,
        /// Show one stored version in full
        #[arg(long)]
        version: Option<f64>,
    },
}

fn parse_attribute(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {}", s))?;
    if key.is_empty() {
        return Err(format!("missing key in {}", s));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

pub async fn run(args: &EntityArgs, ctx: &AppContext) -> anyhow::Result<()> {
    match &args.command {
        EntityCommands::Create {
            kind,
            name,
            container,
            display_name,
            description,
            owner,
            tag,
            child,
            team,
            attributes,
            upsert,
        } => {
            let config = kind.config();
            let mut request = NewEntity::new(*kind, name);

            if let Some(container) = container {
                let parent = lookup_any(ctx, config.containers, container).await?;
                request = request.in_container(parent.reference());
            }
            if let Some(owner) = owner {
                let owner = lookup_any(ctx, &[EntityKind::User, EntityKind::Team], owner).await?;
                request = request.with_owner(owner.reference());
            }
            if !child.is_empty() {
                let spec = config
                    .children
                    .with_context(|| format!("A {} has no children", kind))?;
                for fqn in child {
                    let child = lookup_any(ctx, &[spec.kind], fqn).await?;
                    request = request.with_child(child.reference());
                }
            }
            for fqn in team {
                let team = lookup_any(ctx, &[EntityKind::Team], fqn).await?;
                request = request.with_team(team.reference());
            }
            if let Some(display_name) = display_name {
                request = request.with_display_name(display_name);
            }
            if let Some(description) = description {
                request = request.with_description(description);
            }
            for tag in tag {
                request = request.with_tag(tag);
            }
            for (key, value) in attributes {
                request = request.with_attribute(key, value.clone());
            }

            let outcome = if *upsert {
                ctx.catalog.create_or_update(request, &ctx.principal).await?
            } else {
                ctx.catalog.create(request, &ctx.principal).await?
            };
            tracing::info!("Stored {} {}", kind, outcome.entity.fully_qualified_name);
            print_outcome(&outcome, ctx.format)?;
        }
        EntityCommands::Get { kind, fqn, fields } => {
            let fields = field_set(*kind, fields.as_deref())?;
            let entity = ctx.catalog.get_by_name(*kind, fqn, &fields).await?;
            print_entity(&entity, ctx.format)?;
        }
        EntityCommands::List {
            kind,
            container,
            limit,
            after,
            before,
            fields,
        } => {
            let fields = field_set(*kind, fields.as_deref())?;
            let filter = container.as_deref().map(ListFilter::container).unwrap_or_default();
            let limit = limit.unwrap_or(ctx.default_limit);
            let page = match (after, before) {
                (Some(after), _) => PageRequest::after(limit, after),
                (None, Some(before)) => PageRequest::before(limit, before),
                (None, None) => PageRequest::first(limit),
            };

            let result = ctx.catalog.list(*kind, &filter, &fields, &page).await?;
            print_page(&result.data, &result.paging, ctx.format)?;
        }
        EntityCommands::Patch { kind, fqn, patch, file } => {
            let patch = match (patch, file) {
                (Some(text), _) => Patch::parse(text)?,
                (None, Some(path)) => Patch::from_value(read_json(path)?)?,
                (None, None) => anyhow::bail!("Pass the patch with --patch or --file"),
            };
            let entity = ctx.catalog.get_by_name(*kind, fqn, &FieldSet::none()).await?;
            let outcome = ctx.catalog.patch(&entity.id, &patch, &ctx.principal).await?;
            print_outcome(&outcome, ctx.format)?;
        }
        EntityCommands::Replace { kind, fqn, file } => {
            let entity = ctx.catalog.get_by_name(*kind, fqn, &FieldSet::none()).await?;
            let proposed = Entity::from_json(read_json(file)?)?;
            if proposed.id != entity.id {
                anyhow::bail!("Document in {} describes a different entity than {}", file.display(), fqn);
            }
            let outcome = ctx.catalog.replace(&entity.id, proposed, &ctx.principal).await?;
            print_outcome(&outcome, ctx.format)?;
        }
        EntityCommands::Delete { kind, fqn, force } => {
            let entity = ctx.catalog.get_by_name(*kind, fqn, &FieldSet::none()).await?;
            if !force {
                println!("Use --force to confirm deletion of {} '{}'", kind, fqn);
                return Ok(());
            }

            let removed = ctx.catalog.delete(&entity.id, &ctx.principal).await?;
            if ctx.format == OutputFormat::Json {
                print_json(&removed.to_json()?)?;
            } else if removed.deleted && kind.config().soft_delete {
                println!("Deactivated {}: {}", kind, fqn);
            } else {
                println!("Deleted {}: {}", kind, fqn);
            }
        }
        EntityCommands::History { kind, fqn, version } => {
            let path = EntityPath {
                kind: *kind,
                fqn: fqn.clone(),
            };
            let entity = super::lookup(ctx, &path, &FieldSet::none()).await?;

            if let Some(version) = version {
                let stored = ctx.catalog.get_version(&entity.id, *version).await?;
                return print_entity(&stored, ctx.format);
            }

            let history = ctx.catalog.list_versions(&entity.id).await?;
            if ctx.format == OutputFormat::Json {
                let versions = history
                    .versions
                    .iter()
                    .map(Entity::to_json)
                    .collect::<Result<Vec<_>, _>>()?;
                return print_json(&serde_json::json!({
                    "entityType": history.entity_type,
                    "versions": versions,
                }));
            }

            println!("History of {} ({})", fqn, kind);
            for stored in &history.versions {
                let changes = stored
                    .change_description
                    .as_ref()
                    .map(|c| c.fields().collect::<Vec<_>>().join(", "))
                    .unwrap_or_default();
                println!(
                    "  {:>5}  {}  {:<12}  {}",
                    stored.version,
                    stored.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    stored.updated_by,
                    changes
                );
            }
        }
    }

    Ok(())
}
