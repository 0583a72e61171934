//! Error types for the Tessera handle.

use tessera_config::ConfigError;
use tessera_metadata::MetadataError;
use tessera_query::RlsError;
use tessera_store::RecordError;
use thiserror::Error;

/// Result type for [`crate::Tessera`] operations.
pub type Result<T> = std::result::Result<T, TesseraError>;

/// Errors raised while opening or driving a [`crate::Tessera`] handle.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The catalog could not be loaded.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A storage or mutation failure.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// An ad-hoc query was rejected.
    #[error(transparent)]
    Query(#[from] RlsError),
}
