//! CLI configuration

use std::path::PathBuf;

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tessera_core::limits::validate_limit;
use tessera_core::query::DEFAULT_LIMIT;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "TESSERA_CONFIG";

/// Principal stamped into `updated_by` when none is configured
pub const DEFAULT_PRINCIPAL: &str = "admin";

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Redb,
    Sqlite,
    /// Nothing is persisted; useful for trying commands out
    Memory,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
}

/// Location of the config file (`~/.config/tessera/config.toml` by default)
pub fn config_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
        .join("config.toml")
}

/// Configuration for the CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

impl Config {
    /// Load the config file, falling back to defaults if it is missing or unreadable
    pub fn load() -> Self {
        let path = config_file_path();
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring invalid config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_file_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    pub fn keys() -> &'static [&'static str] {
        &["data_dir", "backend", "default_limit", "principal"]
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "data_dir" => Some(self.data_dir().display().to_string()),
            "backend" => Some(self.backend().as_str().to_string()),
            "default_limit" => Some(self.default_limit().to_string()),
            "principal" => Some(self.principal().to_string()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "data_dir" => self.data_dir = Some(PathBuf::from(value)),
            "backend" => {
                let backend = Backend::from_str(value, true)
                    .map_err(|_| anyhow::anyhow!("Unknown backend: {} (redb, sqlite, memory)", value))?;
                self.backend = Some(backend);
            }
            "default_limit" => {
                let limit: i64 = value
                    .parse()
                    .with_context(|| format!("default_limit must be a number, got {}", value))?;
                validate_limit(limit)?;
                self.default_limit = Some(limit);
            }
            "principal" => self.principal = Some(value.to_string()),
            _ => anyhow::bail!(
                "Unknown config key: {} (available: {})",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }

    pub fn unset(&mut self, key: &str) -> anyhow::Result<()> {
        match key {
            "data_dir" => self.data_dir = None,
            "backend" => self.backend = None,
            "default_limit" => self.default_limit = None,
            "principal" => self.principal = None,
            _ => anyhow::bail!(
                "Unknown config key: {} (available: {})",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }

    /// Every key filled in with its default
    pub fn resolved_defaults() -> Self {
        Self {
            data_dir: Some(default_data_dir()),
            backend: Some(Backend::default()),
            default_limit: Some(DEFAULT_LIMIT),
            principal: Some(DEFAULT_PRINCIPAL.to_string()),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn backend(&self) -> Backend {
        self.backend.unwrap_or_default()
    }

    pub fn default_limit(&self) -> i64 {
        self.default_limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn principal(&self) -> &str {
        self.principal.as_deref().unwrap_or(DEFAULT_PRINCIPAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_validates_values() {
        let mut config = Config::default();
        config.set("backend", "SQLite").unwrap();
        assert_eq!(config.backend(), Backend::Sqlite);
        assert!(config.set("backend", "postgres").is_err());

        config.set("default_limit", "25").unwrap();
        assert_eq!(config.get("default_limit").as_deref(), Some("25"));
        assert!(config.set("default_limit", "0").is_err());
        assert!(config.set("colour", "blue").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.set("principal", "alice").unwrap();
        config.set("backend", "memory").unwrap();

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("backend = \"memory\""));
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.principal(), "alice");
        assert_eq!(back.backend(), Backend::Memory);
        assert_eq!(back.default_limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_unset_restores_default() {
        let mut config = Config::resolved_defaults();
        config.set("principal", "alice").unwrap();
        config.unset("principal").unwrap();
        assert!(config.principal.is_none());
        assert_eq!(config.principal(), DEFAULT_PRINCIPAL);
        assert!(config.unset("colour").is_err());
    }
}
