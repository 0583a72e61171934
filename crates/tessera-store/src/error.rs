//! Mutation engine error types.

use serde::Serialize;
use std::fmt::Display;
use tessera_access::AccessError;
use tessera_metadata::MetadataError;
use tessera_types::Cancelled;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Caller-facing category of a [`RecordError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    PermissionDenied,
    NotFound,
    Internal,
    Cancelled,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
            ErrorKind::Cancelled => "cancelled",
        })
    }
}

/// One rejected record of a bulk insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    /// Position in the submitted batch.
    pub index: usize,
    pub reason: String,
}

/// Errors that can occur during record mutations.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A field constraint, rule or rule evaluation failed.
    #[error("validation failed on '{object}': {message}")]
    Validation {
        object: String,
        field: Option<String>,
        message: String,
    },

    /// Every record of a bulk insert was rejected.
    #[error("all {} records failed validation on '{object}'", failures.len())]
    BulkRejected {
        object: String,
        failures: Vec<BulkFailure>,
    },

    /// A unique field already holds the value.
    #[error("duplicate value '{value}' for unique field '{field}' on '{object}'")]
    Duplicate {
        object: String,
        field: String,
        value: String,
    },

    /// A `Restrict` relationship blocks the delete.
    #[error("cannot delete '{object}': referenced by {relationship}")]
    Restricted { object: String, relationship: String },

    /// Object, field or record-level denial.
    #[error(transparent)]
    PermissionDenied(AccessError),

    /// A permission the access layer does not model, such as purging
    /// another user's deletion.
    #[error("access denied: {0}")]
    Forbidden(String),

    /// The object is not described by metadata.
    #[error("unknown object '{0}'")]
    UnknownObject(String),

    /// The record does not exist.
    #[error("record '{id}' not found in '{object}'")]
    NotFound { object: String, id: String },

    /// The caller cancelled the request or its deadline passed.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Storage failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Metadata could not be loaded.
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Payload encoding failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AccessError> for RecordError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Metadata(inner) => RecordError::Metadata(inner),
            denied => RecordError::PermissionDenied(denied),
        }
    }
}

impl RecordError {
    pub fn validation(
        object: impl Into<String>,
        field: Option<&str>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            object: object.into(),
            field: field.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::BulkRejected { .. } => ErrorKind::Validation,
            Self::Duplicate { .. } | Self::Restricted { .. } => ErrorKind::Conflict,
            Self::PermissionDenied(_) | Self::Forbidden(_) => ErrorKind::PermissionDenied,
            Self::UnknownObject(_) | Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Database(_) | Self::Metadata(_) | Self::Serialization(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Text safe to return to callers. Internal failures are opaque.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Field the error is about, when there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => field.as_deref(),
            Self::Duplicate { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// True for SQLite's "no such table" error.
pub(crate) fn is_missing_table(err: &rusqlite::Error) -> bool {
    err.to_string().contains("no such table")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::Operation;

    #[test]
    fn test_kinds() {
        assert_eq!(
            RecordError::validation("account", Some("name"), "required").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            RecordError::Restricted {
                object: "account".into(),
                relationship: "Contacts".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            RecordError::from(Cancelled::Cancelled).kind(),
            ErrorKind::Cancelled
        );
        assert!(RecordError::UnknownObject("x".into()).is_not_found());
    }

    #[test]
    fn test_access_errors_map_to_permission_denied() {
        let err = RecordError::from(AccessError::ObjectDenied {
            operation: Operation::Create,
            object: "account".into(),
        });
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.public_message(), "access denied: cannot create 'account'");
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let err = RecordError::internal("disk on fire at /var/db");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "internal error");
        assert!(err.to_string().contains("disk on fire"));
    }
}
