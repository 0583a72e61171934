//! Layered configuration loading.
//!
//! Later layers win:
//!
//! 1. [`TesseraConfig::default`]
//! 2. the per-user file (see [`Paths::user_config_file`])
//! 3. `tessera.toml` in the project directory
//! 4. `tessera.local.toml` in the project directory
//! 5. `TESSERA_*` environment variables

use crate::{Paths, TesseraConfig};
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};

/// Builds a [`TesseraConfig`] from every layer.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_layer: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory.
    pub fn new() -> Self {
        let project_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            project_dir,
            env_prefix: "TESSERA".into(),
            user_layer: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().into();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Ignores the per-user file. Tests use this to stay hermetic.
    pub fn without_user_config(mut self) -> Self {
        self.user_layer = false;
        self
    }

    /// Files that exist, lowest precedence first.
    fn files(&self) -> Vec<PathBuf> {
        let user = self
            .user_layer
            .then(|| Paths::new().user_config_file().ok())
            .flatten();
        user.into_iter()
            .chain([
                Paths::project_config_file(&self.project_dir),
                Paths::local_config_file(&self.project_dir),
            ])
            .filter(|path| path.is_file())
            .collect()
    }

    /// Merges every layer, resolves relative paths against the project
    /// directory and validates the result.
    ///
    /// Section and key are joined by `__` in variable names:
    /// `TESSERA_OUTBOX__MAX_ATTEMPTS=3` sets `outbox.max_attempts`.
    pub fn load(self) -> Result<TesseraConfig> {
        let mut layers = Config::builder()
            .add_source(Config::try_from(&TesseraConfig::default())?);
        for path in self.files() {
            layers = layers.add_source(File::from(path).format(FileFormat::Toml));
        }
        layers = layers.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut merged: TesseraConfig = layers
            .build()
            .and_then(|config| config.try_deserialize())
            .context("merging configuration layers")?;
        merged.resolve_paths(&self.project_dir);
        merged.validate().context("checking configuration")?;
        Ok(merged)
    }

    /// Like [`ConfigLoader::load`], falling back to defaults on any error.
    pub fn load_or_default(self) -> TesseraConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueryDialect;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("TESSERA_TEST_UNSET")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config.outbox.max_attempts, 5);
        assert_eq!(config.bulk.batch_size, 100);
        assert_eq!(config.access.super_user_profile, "system_admin");
        assert_eq!(config.query.dialect, QueryDialect::Generic);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[database]
path = "data/records.db"
busy_timeout_ms = 2500

[outbox]
poll_interval_ms = 250
max_attempts = 3

[query]
dialect = "sqlite"
reject_unresolved_sources = true
"#;
        fs::write(project_dir.join("tessera.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.database.path, project_dir.join("data/records.db"));
        assert_eq!(config.database.busy_timeout_ms, 2500);
        assert_eq!(config.outbox.poll_interval_ms, 250);
        assert_eq!(config.outbox.max_attempts, 3);
        assert_eq!(config.query.dialect, QueryDialect::Sqlite);
        assert!(config.query.reject_unresolved_sources);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("tessera.toml"),
            "[access]\nsuper_user_profile = \"admin\"\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("tessera.local.toml"),
            "[access]\nsuper_user_profile = \"root\"\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");
        assert_eq!(config.access.super_user_profile, "root");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("tessera.toml"),
            "[outbox]\nmax_attempts = 0\n",
        )
        .expect("Failed to write config");

        assert!(loader(temp_dir.path()).load().is_err());
    }

    #[test]
    fn test_path_resolution() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");
        assert!(config.database.path.is_absolute());
        assert!(config.metadata.catalog_path.is_none());
    }
}
