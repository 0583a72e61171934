//! Error types for the row-level-security rewriter.

use tessera_metadata::MetadataError;
use thiserror::Error;

/// Error type for query rewriting. Every failure rejects the query.
#[derive(Debug, Error)]
pub enum RlsError {
    /// The text could not be parsed.
    #[error("failed to parse query: {0}")]
    Parse(String),

    /// No statement was found.
    #[error("empty query")]
    Empty,

    /// More than one statement was submitted.
    #[error("expected a single statement, found {0}")]
    MultipleStatements(usize),

    /// The statement could modify data.
    #[error("only read-only SELECT statements are allowed")]
    NotReadOnly,

    /// The actor cannot read a referenced table.
    #[error("access denied: cannot read table '{table}'")]
    TableDenied { table: String },

    /// The actor cannot see a referenced column.
    #[error("access denied: cannot read field '{field}' on table '{table}'")]
    FieldDenied { table: String, field: String },

    /// A column qualifier names no table, alias or CTE in scope.
    #[error("access denied: cannot resolve '{qualifier}.{field}'")]
    UnknownQualifier { qualifier: String, field: String },

    /// The ownership predicate cannot cover every owned table the query
    /// reads, and the rewriter is configured to reject such queries.
    #[error("query source cannot be resolved to a single table")]
    UnresolvedSource,

    /// A value could not be safely embedded as a literal.
    #[error("invalid SQL literal in row filter: {0:?}")]
    UnsafeLiteral(String),

    /// The frontend could not rewrite the statement.
    #[error("unsupported query: {0}")]
    Unsupported(String),

    /// Metadata could not be loaded.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Result type for query rewriting.
pub type Result<T> = std::result::Result<T, RlsError>;
