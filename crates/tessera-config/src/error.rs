//! Errors raised while locating, reading or checking configuration.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`crate::TesseraConfig`].
    #[error("{} is not a valid tessera config: {source}", path.display())]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A value is out of range, e.g. a zero batch size.
    #[error("invalid configuration: {0}")]
    ValidationError(String),

    /// No home directory, so the per-user config location is unknown.
    #[error("per-user config location unavailable: {0}")]
    XdgError(String),
}
