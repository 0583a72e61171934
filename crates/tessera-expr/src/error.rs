//! Expression error types.

use thiserror::Error;

/// Error type for expression parsing and evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// The expression text is malformed.
    #[error("syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    /// A function name that the evaluator does not provide.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A function called with the wrong number of arguments.
    #[error("function {function} expects {expected} argument(s), got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    /// Operands that the operator cannot combine.
    #[error("cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    /// A dotted reference whose root is neither `record` nor `user`.
    #[error("unknown reference '{0}'")]
    UnknownReference(String),

    /// A boolean was required but the expression produced something else.
    #[error("expression produced {0}, expected boolean")]
    NotBoolean(&'static str),
}

/// Result type for expression operations.
pub type Result<T> = std::result::Result<T, EvalError>;
