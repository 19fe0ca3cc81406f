//! Relation commands

use clap::{Args, Subcommand};

use super::{lookup, lookup_any, EntityPath};
use crate::output::{print_json, OutputFormat};
use crate::AppContext;
use tessera_catalog::FollowOutcome;
use tessera_core::{EntityKind, FieldSet};

#[derive(Args)]
pub struct RelationArgs {
    #[command(subcommand)]
    pub command: RelationCommands,
}

#[derive(Subcommand)]
pub enum RelationCommands {
    /// Follow an entity
    Follow {
        /// Entity to follow, as <type>:<fqn>
        target: EntityPath,
        /// Following user
        #[arg(short, long)]
        user: String,
    },
    /// Stop following an entity
    Unfollow {
        /// Followed entity, as <type>:<fqn>
        target: EntityPath,
        /// Following user
        #[arg(short, long)]
        user: String,
    },
    /// Record that data flows from one entity to another
    AddLineage {
        /// Upstream entity, as <type>:<fqn>
        from: EntityPath,
        /// Downstream entity, as <type>:<fqn>
        to: EntityPath,
    },
    /// Remove a lineage edge
    RemoveLineage {
        from: EntityPath,
        to: EntityPath,
    },
}

fn report(ctx: &AppContext, changed: bool, message: String) -> anyhow::Result<()> {
    if ctx.format == OutputFormat::Json {
        return print_json(&serde_json::json!({ "changed": changed }));
    }
    println!("{}", message);
    Ok(())
}

pub async fn run(args: &RelationArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let none = FieldSet::none();

    match &args.command {
        RelationCommands::Follow { target, user } => {
            let entity = lookup(ctx, target, &none).await?;
            let user = lookup_any(ctx, &[EntityKind::User], user).await?;
            let outcome = ctx.catalog.add_follower(&entity.id, &user.id).await?;
            let message = match outcome {
                FollowOutcome::Created => format!("{} now follows {}", user.name, target.fqn),
                FollowOutcome::AlreadyExists => format!("{} already follows {}", user.name, target.fqn),
            };
            report(ctx, outcome == FollowOutcome::Created, message)?;
        }
        RelationCommands::Unfollow { target, user } => {
            let entity = lookup(ctx, target, &none).await?;
            let user = lookup_any(ctx, &[EntityKind::User], user).await?;
            let removed = ctx.catalog.remove_follower(&entity.id, &user.id).await?;
            let message = if removed {
                format!("{} no longer follows {}", user.name, target.fqn)
            } else {
                format!("{} was not following {}", user.name, target.fqn)
            };
            report(ctx, removed, message)?;
        }
        RelationCommands::AddLineage { from, to } => {
            let upstream = lookup(ctx, from, &none).await?;
            let downstream = lookup(ctx, to, &none).await?;
            let added = ctx.catalog.add_lineage(&upstream.id, &downstream.id).await?;
            let message = if added {
                format!("Added lineage {} -> {}", from.fqn, to.fqn)
            } else {
                format!("Lineage {} -> {} already exists", from.fqn, to.fqn)
            };
            report(ctx, added, message)?;
        }
        RelationCommands::RemoveLineage { from, to } => {
            let upstream = lookup(ctx, from, &none).await?;
            let downstream = lookup(ctx, to, &none).await?;
            let removed = ctx.catalog.remove_lineage(&upstream.id, &downstream.id).await?;
            let message = if removed {
                format!("Removed lineage {} -> {}", from.fqn, to.fqn)
            } else {
                format!("No lineage {} -> {}", from.fqn, to.fqn)
            };
            report(ctx, removed, message)?;
        }
    }

    Ok(())
}
