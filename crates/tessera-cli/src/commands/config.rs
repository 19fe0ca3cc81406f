//! Config command for managing CLI configuration

use clap::{Args, Subcommand};

use crate::config::{config_file_path, Config};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Get a config value
    Get {
        /// Config key name
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key name
        key: String,
        /// New value
        value: String,
    },
    /// Reset a config value to its default
    Unset {
        /// Config key name
        key: String,
    },
    /// List all config values, defaults included
    List,
    /// Show config file path
    Path,
    /// Write a config file with every default spelled out
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(args: &ConfigArgs) -> anyhow::Result<()> {
    match &args.command {
        ConfigCommands::Get { key } => run_get(key),
        ConfigCommands::Set { key, value } => run_set(key, value),
        ConfigCommands::Unset { key } => run_unset(key),
        ConfigCommands::List => run_list(),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Init { force } => run_init(*force),
    }
}

fn run_get(key: &str) -> anyhow::Result<()> {
    let config = Config::load();
    let value = config.get(key).ok_or_else(|| {
        anyhow::anyhow!(
            "Unknown config key: {} (available: {})",
            key,
            Config::keys().join(", ")
        )
    })?;
    println!("{}", value);
    Ok(())
}

fn run_set(key: &str, value: &str) -> anyhow::Result<()> {
    let mut config = Config::load();
    config.set(key, value)?;
    config.save()?;
    tracing::info!("Saved {} to {}", key, config_file_path().display());
    println!("Set {} = {}", key, value);
    Ok(())
}

fn run_unset(key: &str) -> anyhow::Result<()> {
    let mut config = Config::load();
    config.unset(key)?;
    config.save()?;
    println!("Unset {} (now {})", key, config.get(key).unwrap_or_default());
    Ok(())
}

fn run_list() -> anyhow::Result<()> {
    let config = Config::load();
    println!("Config file: {}", config_file_path().display());
    println!();
    for key in Config::keys() {
        let value = config.get(key).unwrap_or_default();
        println!("{} = {}", key, value);
    }
    Ok(())
}

fn run_path() -> anyhow::Result<()> {
    println!("{}", config_file_path().display());
    Ok(())
}

fn run_init(force: bool) -> anyhow::Result<()> {
    let path = config_file_path();

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    Config::resolved_defaults().save()?;
    println!("Created config file at {}", path.display());
    Ok(())
}
