//! Where configuration and state live on disk.

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

const PROJECT_FILE: &str = "tessera.toml";
const LOCAL_FILE: &str = "tessera.local.toml";
const USER_FILE: &str = "config.toml";
const STATE_DIR: &str = ".tessera";

/// Resolves per-user and per-project file locations.
///
/// Per-user locations follow the platform convention (`$XDG_CONFIG_HOME`
/// on Linux); they are unavailable when no home directory can be found.
pub struct Paths {
    dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            dirs: ProjectDirs::from("com", "Tessera", "tessera"),
        }
    }

    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.dirs {
            Some(dirs) => Ok(dirs.config_dir().to_path_buf()),
            None => Err(ConfigError::XdgError("no home directory".into())),
        }
    }

    /// `config.toml` inside [`Paths::user_config_dir`].
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        self.user_config_dir().map(|dir| dir.join(USER_FILE))
    }

    /// Checked-in project settings.
    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_FILE)
    }

    /// Machine-local overrides, meant to stay out of version control.
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_FILE)
    }

    /// Holds the default database file.
    pub fn state_dir(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(STATE_DIR)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_user_config_file_name() {
        // CI containers may have no home directory.
        if let Ok(file) = Paths::new().user_config_file() {
            assert!(file.ends_with("config.toml"));
            assert!(file.to_string_lossy().contains("tessera"));
        }
    }

    #[test]
    fn test_project_relative_files() {
        let dir = tempdir().expect("Failed to create temp dir");
        let root = dir.path();

        assert_eq!(Paths::project_config_file(root), root.join("tessera.toml"));
        assert_eq!(Paths::local_config_file(root), root.join("tessera.local.toml"));
        assert_eq!(Paths::state_dir(root), root.join(".tessera"));
    }
}
