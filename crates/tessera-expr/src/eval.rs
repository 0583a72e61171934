//! Tree-walking evaluation.

use crate::EvalContext;
use crate::error::{EvalError, Result};
use crate::parser::{BinaryOp, Expr, UnaryOp};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use tessera_types::Value;

pub(crate) fn eval(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Reference(path) => resolve(path, ctx),
        Expr::Unary { op, expr } => {
            let value = eval(expr, ctx)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy("!", &value)?)),
                UnaryOp::Neg => match value {
                    Value::Number(n) => Ok(Value::Number(-n)),
                    Value::Null => Ok(Value::Null),
                    other => Err(EvalError::TypeMismatch {
                        op: "-",
                        left: "nothing",
                        right: other.type_name(),
                    }),
                },
            }
        }
        Expr::Binary { op, left, right } => binary(*op, left, right, ctx),
        Expr::Call { name, args } => call(name, args, ctx),
    }
}

fn resolve(path: &[String], ctx: &EvalContext<'_>) -> Result<Value> {
    match path {
        [field] => Ok(ctx.record.get(field).cloned().unwrap_or_default()),
        [root, field] if root.eq_ignore_ascii_case("record") => {
            Ok(ctx.record.get(field).cloned().unwrap_or_default())
        }
        [root, attribute] if root.eq_ignore_ascii_case("user") => {
            let Some(user) = ctx.user else {
                return Ok(Value::Null);
            };
            let value = match attribute.to_ascii_lowercase().as_str() {
                "id" => Value::from(user.id.as_str()),
                "name" => Value::from(user.name.as_str()),
                "email" => Value::from(user.email.clone()),
                "profile_id" => Value::from(user.profile_id.as_str()),
                "role_id" => Value::from(user.role_id.clone()),
                _ => return Err(EvalError::UnknownReference(path.join("."))),
            };
            Ok(value)
        }
        _ => Err(EvalError::UnknownReference(path.join("."))),
    }
}

/// Logical operands: booleans as-is, null as false, anything else is an error.
fn truthy(op: &'static str, value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvalError::TypeMismatch {
            op,
            left: "boolean",
            right: other.type_name(),
        }),
    }
}

fn binary(op: BinaryOp, left: &Expr, right: &Expr, ctx: &EvalContext<'_>) -> Result<Value> {
    match op {
        BinaryOp::Or => {
            if truthy("||", &eval(left, ctx)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy("||", &eval(right, ctx)?)?))
        }
        BinaryOp::And => {
            if !truthy("&&", &eval(left, ctx)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy("&&", &eval(right, ctx)?)?))
        }
        BinaryOp::Eq => Ok(Value::Bool(equals(&eval(left, ctx)?, &eval(right, ctx)?))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(&eval(left, ctx)?, &eval(right, ctx)?))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let (l, r) = (eval(left, ctx)?, eval(right, ctx)?);
            let Some(ordering) = compare(op, &l, &r)? else {
                return Ok(Value::Bool(false));
            };
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (l, r) = (eval(left, ctx)?, eval(right, ctx)?);
            match (&l, &r) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    _ => a / b,
                })),
                (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
                    Ok(Value::String(format!("{a}{b}")))
                }
                _ => Err(mismatch(op, &l, &r)),
            }
        }
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// Equality across variants is false, never an error. Timestamps compare
/// against RFC 3339 strings.
fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Timestamp(ts), Value::String(s)) | (Value::String(s), Value::Timestamp(ts)) => {
            parse_timestamp(s).is_some_and(|parsed| parsed == *ts)
        }
        _ => left == right,
    }
}

/// Orders two values. `None` means a null operand, which makes any
/// ordering comparison false.
fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Option<Ordering>> {
    let ordering = match (left, right) {
        (Value::Null, _) | (_, Value::Null) => return Ok(None),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::String(s)) => parse_timestamp(s).map(|b| a.cmp(&b)),
        (Value::String(s), Value::Timestamp(b)) => parse_timestamp(s).map(|a| a.cmp(b)),
        _ => None,
    };
    ordering
        .map(Some)
        .ok_or_else(|| mismatch(op, left, right))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn call(name: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value> {
    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalError::Arity {
                function: name.to_string(),
                expected,
                found: args.len(),
            })
        }
    };

    match name {
        "ISBLANK" => {
            arity(1)?;
            Ok(Value::Bool(eval(&args[0], ctx)?.is_blank()))
        }
        "LEN" => {
            arity(1)?;
            let value = eval(&args[0], ctx)?;
            Ok(Value::Number(value.to_string().chars().count() as f64))
        }
        "LOWER" | "UPPER" => {
            arity(1)?;
            match eval(&args[0], ctx)? {
                Value::Null => Ok(Value::Null),
                Value::String(s) if name == "LOWER" => Ok(Value::String(s.to_lowercase())),
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                other => Err(EvalError::TypeMismatch {
                    op: "LOWER/UPPER",
                    left: "string",
                    right: other.type_name(),
                }),
            }
        }
        "CONTAINS" | "BEGINS" => {
            arity(2)?;
            let haystack = eval(&args[0], ctx)?;
            let needle = eval(&args[1], ctx)?;
            match (&haystack, &needle) {
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Bool(false)),
                (Value::String(h), Value::String(n)) if name == "CONTAINS" => {
                    Ok(Value::Bool(h.contains(n.as_str())))
                }
                (Value::String(h), Value::String(n)) => Ok(Value::Bool(h.starts_with(n.as_str()))),
                _ => Err(EvalError::TypeMismatch {
                    op: "CONTAINS/BEGINS",
                    left: haystack.type_name(),
                    right: needle.type_name(),
                }),
            }
        }
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}
