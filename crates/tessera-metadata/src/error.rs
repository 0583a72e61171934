//! Metadata error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read catalog at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse JSON catalog at {path}: {source}")]
    ParseJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to parse TOML catalog at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("unsupported catalog format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("metadata lock poisoned")]
    LockPoisoned,
}

/// Result type for metadata operations.
pub type Result<T> = std::result::Result<T, MetadataError>;
