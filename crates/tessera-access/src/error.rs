//! Access control error types.

use tessera_metadata::MetadataError;
use tessera_types::Operation;
use thiserror::Error;

/// Error type for access checks.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The actor's profile does not grant the operation on the object.
    #[error("access denied: cannot {operation} '{object}'")]
    ObjectDenied { operation: Operation, object: String },

    /// The actor may not see or change a field.
    #[error("access denied: cannot {operation} field '{field}' on '{object}'")]
    FieldDenied {
        operation: Operation,
        object: String,
        field: String,
    },

    /// No record-level rule grants the operation.
    #[error("access denied: cannot {operation} record '{record_id}' of '{object}'")]
    RecordDenied {
        operation: Operation,
        object: String,
        record_id: String,
    },

    /// Metadata could not be loaded while checking access.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Result type for access checks.
pub type Result<T> = std::result::Result<T, AccessError>;
