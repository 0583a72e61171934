//! # tessera-expr: Expression evaluation
//!
//! Validation rules and sharing-rule criteria are boolean expressions over
//! a record and the acting user. The mutation engine and the access layer
//! only see the [`Evaluator`] trait; [`ExpressionEvaluator`] is the default
//! implementation.
//!
//! ```text
//! amount > 1000 && ISBLANK(approver_id)
//! user.role_id == "r_sales" || stage != 'Closed'
//! ```
//!
//! Every error is reported to the caller. Callers are expected to treat an
//! error as a failed check.

mod error;
mod eval;
mod lexer;
mod parser;

pub use error::{EvalError, Result};
pub use parser::{BinaryOp, Expr, UnaryOp, parse};

use tessera_types::{Record, UserSession, Value};

/// Inputs an expression may reference.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub record: &'a Record,
    pub user: Option<&'a UserSession>,
}

impl<'a> EvalContext<'a> {
    pub fn new(record: &'a Record, user: Option<&'a UserSession>) -> Self {
        Self { record, user }
    }
}

/// Evaluates an expression string against a context.
pub trait Evaluator: Send + Sync {
    fn evaluate(&self, expression: &str, ctx: &EvalContext<'_>) -> Result<Value>;

    /// Evaluates and requires a boolean result.
    fn evaluate_bool(&self, expression: &str, ctx: &EvalContext<'_>) -> Result<bool> {
        match self.evaluate(expression, ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotBoolean(other.type_name())),
        }
    }
}

/// The built-in evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionEvaluator;

impl ExpressionEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for ExpressionEvaluator {
    fn evaluate(&self, expression: &str, ctx: &EvalContext<'_>) -> Result<Value> {
        let expr = parse(expression)?;
        eval::eval(&expr, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn account() -> Record {
        Record::new()
            .with("name", "Acme")
            .with("amount", 1500)
            .with("stage", "Open")
            .with("approver_id", Value::Null)
            .with("is_active", true)
    }

    fn eval_bool(expression: &str) -> Result<bool> {
        let record = account();
        let user = UserSession::new("u1", "Ada", "standard").with_role("r_sales");
        let ctx = EvalContext::new(&record, Some(&user));
        ExpressionEvaluator::new().evaluate_bool(expression, &ctx)
    }

    #[test_case("amount > 1000", true)]
    #[test_case("amount >= 1500 && stage == 'Open'", true)]
    #[test_case("amount < 10 || stage != \"Open\"", false)]
    #[test_case("ISBLANK(approver_id)", true)]
    #[test_case("NOT is_active", false)]
    #[test_case("!(amount > 1000) OR is_active", true)]
    #[test_case("user.role_id == 'r_sales'", true)]
    #[test_case("record.name == 'Acme'", true)]
    #[test_case("LEN(name) == 4", true)]
    #[test_case("BEGINS(LOWER(name), 'ac')", true)]
    #[test_case("CONTAINS(UPPER(stage), 'PEN')", true)]
    #[test_case("amount * 2 - 1000 == 2000", true)]
    #[test_case("missing_field > 5", false)]
    #[test_case("missing_field == null", true)]
    fn test_evaluates(expression: &str, expected: bool) {
        assert_eq!(eval_bool(expression).unwrap(), expected);
    }

    #[test_case("amount >"; "dangling operator")]
    #[test_case("(amount > 5"; "unbalanced paren")]
    #[test_case("amount > 'x'"; "type mismatch")]
    #[test_case("NOSUCH(amount)"; "unknown function")]
    #[test_case("'unterminated"; "unterminated string")]
    #[test_case("amount"; "not boolean")]
    #[test_case("org.id == 1"; "unknown root")]
    fn test_errors(expression: &str) {
        assert!(eval_bool(expression).is_err());
    }

    #[test]
    fn test_no_user_reads_as_null() {
        let record = account();
        let ctx = EvalContext::new(&record, None);
        let value = ExpressionEvaluator::new()
            .evaluate("user.id", &ctx)
            .unwrap();
        assert_eq!(value, Value::Null);
    }
}
