//! Tessera CLI - Command line interface for the metadata catalog

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{completions, entity, lineage, relation};
use config::{Backend, Config};
use output::OutputFormat;
use tessera_catalog::Catalog;
use tessera_storage::{MemoryStorage, StorageBackend};

#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about = "Metadata catalog for data assets, ownership and lineage")]
pub struct Cli {
    /// Data directory
    #[arg(short, long, global = true)]
    pub data_dir: Option<String>,

    /// Storage backend (overrides the config file)
    #[arg(short, long, value_enum, global = true)]
    pub backend: Option<Backend>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Name recorded as the author of writes
    #[arg(long = "as", global = true)]
    pub principal: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the data directory path
    pub fn data_dir(&self, config: &Config) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| config.data_dir())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create, read, update and delete entities
    Entity(entity::EntityArgs),
    /// Manage followers and lineage edges
    Relation(relation::RelationArgs),
    /// Show the lineage graph around an entity
    Lineage(lineage::LineageArgs),
    /// Manage CLI configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Application context with the catalog and resolved settings
pub struct AppContext {
    pub catalog: Catalog<dyn StorageBackend>,
    pub principal: String,
    pub default_limit: i64,
    pub format: OutputFormat,
}

impl AppContext {
    pub async fn new(cli: &Cli, config: &Config) -> anyhow::Result<Self> {
        let backend = cli.backend.unwrap_or_else(|| config.backend());
        let storage = open_storage(backend, &cli.data_dir(config))?;
        storage.initialize().await?;

        Ok(Self {
            catalog: Catalog::new(storage),
            principal: cli
                .principal
                .clone()
                .unwrap_or_else(|| config.principal().to_string()),
            default_limit: config.default_limit(),
            format: OutputFormat::from(cli.format.as_str()),
        })
    }
}

fn open_storage(backend: Backend, data_dir: &Path) -> anyhow::Result<Arc<dyn StorageBackend>> {
    if backend == Backend::Memory {
        tracing::debug!("Using in-memory storage");
        return Ok(Arc::new(MemoryStorage::new()));
    }

    std::fs::create_dir_all(data_dir)?;
    match backend {
        #[cfg(feature = "redb")]
        Backend::Redb => {
            let db_path = data_dir.join("tessera.redb");
            tracing::debug!("Using database at: {:?}", db_path);
            Ok(Arc::new(tessera_storage::RedbStorage::open(&db_path)?))
        }
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => {
            let db_path = data_dir.join("tessera.sqlite");
            tracing::debug!("Using database at: {:?}", db_path);
            Ok(Arc::new(tessera_storage::SqliteStorage::open(&db_path)?))
        }
        #[allow(unreachable_patterns)]
        other => anyhow::bail!("This build of tessera has no {} backend", other.as_str()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting tessera CLI");

    match &cli.command {
        Commands::Config(args) => return commands::config::run(args).await,
        Commands::Completions(args) => return completions::run(args),
        _ => {}
    }

    let config = Config::load();
    let ctx = AppContext::new(&cli, &config).await?;

    match &cli.command {
        Commands::Entity(args) => entity::run(args, &ctx).await?,
        Commands::Relation(args) => relation::run(args, &ctx).await?,
        Commands::Lineage(args) => lineage::run(args, &ctx).await?,
        Commands::Config(_) | Commands::Completions(_) => {}
    }

    ctx.catalog.storage().close().await?;
    Ok(())
}
