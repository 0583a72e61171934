//! Type coercion, static field constraints and validation rules.
//!
//! Everything here fails closed: a constraint that cannot be checked, such
//! as an uncompilable pattern or a rule that does not evaluate to a
//! boolean, rejects the record.

use crate::codec::parse_timestamp;
use crate::error::{RecordError, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tessera_expr::{EvalContext, Evaluator};
use tessera_metadata::{FieldMetadata, FieldType, ObjectMetadata, ValidationRule};
use tessera_types::{Record, UserSession, Value};
use tracing::warn;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";
const URL_PATTERN: &str = r"^(?i)https?://[^\s/$.?#][^\s]*$";
const PHONE_PATTERN: &str = r"^\+?[0-9 ().\-]{7,20}$";

/// Validates records against field metadata and rules.
///
/// Compiled patterns are cached by source text.
#[derive(Debug, Default)]
pub(crate) struct Validator {
    patterns: Mutex<HashMap<String, Regex>>,
}

impl Validator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn pattern(&self, source: &str) -> std::result::Result<Regex, regex::Error> {
        let mut patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(regex) = patterns.get(source) {
            return Ok(regex.clone());
        }
        let regex = Regex::new(source)?;
        patterns.insert(source.to_string(), regex.clone());
        Ok(regex)
    }

    fn matches(&self, schema: &ObjectMetadata, field: &str, source: &str, text: &str) -> Result<bool> {
        self.pattern(source).map(|re| re.is_match(text)).map_err(|e| {
            RecordError::validation(
                &schema.api_name,
                Some(field),
                format!("field '{field}' has an invalid pattern: {e}"),
            )
        })
    }

    /// Converts the record's values to their fields' types in place.
    pub(crate) fn coerce(&self, schema: &ObjectMetadata, record: &mut Record) -> Result<()> {
        let keys: Vec<String> = record.keys().cloned().collect();
        for key in keys {
            let Some(field) = schema.field(&key) else {
                continue;
            };
            let Some(value) = record.remove(&key) else {
                continue;
            };
            let coerced = coerce_value(field, value).map_err(|message| {
                RecordError::validation(&schema.api_name, Some(&field.api_name), message)
            })?;
            record.insert(key, coerced);
        }
        Ok(())
    }

    /// Required, format, length, range, pattern and picklist checks over
    /// every writable field.
    pub(crate) fn check_fields(&self, schema: &ObjectMetadata, record: &Record) -> Result<()> {
        for field in &schema.fields {
            if field.is_read_only() {
                continue;
            }
            let value = record.get(&field.api_name).unwrap_or(&Value::Null);
            self.check_field(schema, field, value)?;
        }
        Ok(())
    }

    fn check_field(&self, schema: &ObjectMetadata, field: &FieldMetadata, value: &Value) -> Result<()> {
        let name = field.api_name.as_str();
        let fail = |message: String| Err(RecordError::validation(&schema.api_name, Some(name), message));

        if value.is_blank() {
            if field.required {
                return fail(format!("field '{name}' is required"));
            }
            return Ok(());
        }

        if let Value::String(text) = value {
            let format = match field.field_type {
                FieldType::Email => Some((EMAIL_PATTERN, "email address")),
                FieldType::Url => Some((URL_PATTERN, "URL")),
                FieldType::Phone => Some((PHONE_PATTERN, "phone number")),
                _ => None,
            };
            if let Some((pattern, what)) = format {
                if !self.matches(schema, name, pattern, text)? {
                    return fail(format!("field '{name}' must be a valid {what}"));
                }
            }

            let length = text.chars().count();
            if let Some(min) = field.min_length.filter(|min| length < *min) {
                return fail(format!("field '{name}' must be at least {min} characters"));
            }
            if let Some(max) = field.max_length.filter(|max| length > *max) {
                return fail(format!("field '{name}' must be at most {max} characters"));
            }

            if let Some(pattern) = field.regex.as_deref().filter(|p| !p.is_empty()) {
                if !self.matches(schema, name, pattern, text)? {
                    let message = field
                        .regex_message
                        .clone()
                        .filter(|m| !m.is_empty())
                        .unwrap_or_else(|| "invalid format".to_string());
                    return fail(message);
                }
            }

            if field.field_type == FieldType::Picklist
                && !field.picklist_values.is_empty()
                && !field.picklist_values.iter().any(|option| option == text)
            {
                return fail(format!("'{text}' is not a valid option for field '{name}'"));
            }
        }

        if let Value::Number(n) = value {
            if let Some(min) = field.min_value.filter(|min| n < min) {
                return fail(format!("field '{name}' must be at least {min}"));
            }
            if let Some(max) = field.max_value.filter(|max| n > max) {
                return fail(format!("field '{name}' must be at most {max}"));
            }
        }
        Ok(())
    }

    /// Evaluates active rules. A rule whose condition is true rejects the
    /// record with its message; an evaluation error rejects it too.
    pub(crate) fn check_rules(
        &self,
        evaluator: &dyn Evaluator,
        rules: &[ValidationRule],
        schema: &ObjectMetadata,
        record: &Record,
        actor: Option<&UserSession>,
    ) -> Result<()> {
        let ctx = EvalContext::new(record, actor);
        for rule in rules.iter().filter(|rule| rule.active) {
            match evaluator.evaluate_bool(&rule.condition, &ctx) {
                Ok(false) => {}
                Ok(true) => {
                    return Err(RecordError::validation(
                        &schema.api_name,
                        None,
                        rule.error_message.clone(),
                    ));
                }
                Err(e) => {
                    warn!(object = %schema.api_name, rule = %rule.name, error = %e, "Validation rule failed to evaluate");
                    return Err(RecordError::validation(
                        &schema.api_name,
                        None,
                        format!("validation rule '{}' could not be evaluated: {e}", rule.name),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn coerce_value(field: &FieldMetadata, value: Value) -> std::result::Result<Value, String> {
    let name = &field.api_name;
    if value.is_null() {
        return Ok(value);
    }
    match field.field_type {
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value),
            Value::Number(n) if n == 0.0 || n == 1.0 => Ok(Value::Bool(n == 1.0)),
            Value::String(ref s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                "" => Ok(Value::Null),
                _ => Err(format!("field '{name}' expects a boolean")),
            },
            _ => Err(format!("field '{name}' expects a boolean")),
        },
        t if t.is_numeric() => match value {
            Value::Number(_) => Ok(value),
            Value::String(ref s) if s.trim().is_empty() => Ok(Value::Null),
            Value::String(ref s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Value::Number)
                .ok_or_else(|| format!("field '{name}' expects a number")),
            _ => Err(format!("field '{name}' expects a number")),
        },
        t if t.is_temporal() => match value {
            Value::Timestamp(_) => Ok(value),
            Value::String(ref s) if s.trim().is_empty() => Ok(Value::Null),
            Value::String(ref s) => parse_timestamp(s.trim())
                .map(Value::Timestamp)
                .ok_or_else(|| format!("field '{name}' expects a date")),
            _ => Err(format!("field '{name}' expects a date")),
        },
        FieldType::Json => match value {
            Value::String(ref s) if s.trim_start().starts_with(['{', '[']) => {
                serde_json::from_str(s)
                    .map(Value::Nested)
                    .map_err(|e| format!("field '{name}' holds invalid JSON: {e}"))
            }
            other => Ok(other),
        },
        _ => match value {
            Value::String(_) => Ok(value),
            Value::Nested(_) => Err(format!("field '{name}' expects text")),
            other => Ok(Value::String(other.to_string())),
        },
    }
}
