//! Settings for a Tessera store: database file, metadata catalog, access
//! defaults, query rewriting, outbox delivery and bulk inserts.
//!
//! [`ConfigLoader`] merges defaults, the per-user file, `tessera.toml`,
//! `tessera.local.toml` and `TESSERA_*` variables, in that order.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Tessera configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    pub database: DatabaseConfig,
    pub access: AccessConfig,
    pub bulk: BulkConfig,
    pub outbox: OutboxConfig,
    pub query: QueryConfig,
    pub metadata: MetadataConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// How long a writer waits for the database lock.
    pub busy_timeout_ms: u64,
    /// Idle connections kept for reuse.
    pub max_idle_connections: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".tessera/tessera.db"),
            busy_timeout_ms: 5_000,
            max_idle_connections: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Profile that bypasses access checks.
    pub super_user_profile: String,
    /// Display name recorded for events raised without an actor.
    pub system_user_name: String,
    /// Log every access decision.
    pub audit: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            super_user_profile: "system_admin".to_string(),
            system_user_name: "System".to_string(),
            audit: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfig {
    /// Rows per multi-row INSERT.
    pub batch_size: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub poll_interval_ms: u64,
    /// Events claimed per poll.
    pub batch_size: usize,
    /// Delivery attempts before an event is marked failed.
    pub max_attempts: u32,
    /// A claimed event not finished within this many seconds is reclaimed.
    pub claim_lease_secs: u64,
    /// Processed events older than this are removed by cleanup.
    pub retention_hours: u64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 100,
            max_attempts: 5,
            claim_lease_secs: 300,
            retention_hours: 168,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryDialect {
    #[default]
    Generic,
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub dialect: QueryDialect,
    /// Reject ad-hoc queries whose source is not a single table instead of
    /// running them without an ownership predicate.
    pub reject_unresolved_sources: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// JSON or TOML catalog of objects, rules and sequences.
    pub catalog_path: Option<PathBuf>,
}

impl TesseraConfig {
    /// Loads with the current directory as the project root.
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Loads with `project_dir` as the project root.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file, without layering.
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Configuration rooted in `dir`, for tests and embedding.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.resolve_paths(dir);
        config
    }

    /// Makes the database and catalog paths absolute against `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if self.database.path.is_relative() {
            self.database.path = base.join(&self.database.path);
        }

        if let Some(catalog) = &self.metadata.catalog_path {
            if catalog.is_relative() {
                self.metadata.catalog_path = Some(base.join(catalog));
            }
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.bulk.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "bulk.batch_size must be at least 1".to_string(),
            ));
        }
        if self.outbox.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "outbox.batch_size must be at least 1".to_string(),
            ));
        }
        if self.outbox.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "outbox.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.access.super_user_profile.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "access.super_user_profile must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
