//! Conversion between [`Value`] and SQLite values.
//!
//! | Logical | Stored |
//! |---------|--------|
//! | boolean | INTEGER 0/1 |
//! | number, currency, percent | REAL |
//! | date, date/time | TEXT, RFC 3339 with milliseconds |
//! | json | TEXT, serialized JSON |
//! | everything else | TEXT |

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::{Value as SqlValue, ValueRef};
use tessera_metadata::{FieldType, ObjectMetadata};
use tessera_types::{Record, Value};

/// Double-quotes an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses RFC 3339 or a bare `YYYY-MM-DD` date.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Encodes a value for a column of the given logical type.
pub fn to_sql(value: &Value, field_type: FieldType) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if field_type == FieldType::Boolean {
                SqlValue::Integer(i64::from(*n != 0.0))
            } else if field_type.is_numeric() {
                SqlValue::Real(*n)
            } else {
                SqlValue::Text(Value::Number(*n).to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Timestamp(ts) => SqlValue::Text(format_timestamp(ts)),
        Value::Nested(json) => SqlValue::Text(json.to_string()),
    }
}

/// Decodes a stored value for a column of the given logical type.
pub fn from_sql(raw: ValueRef<'_>, field_type: FieldType) -> Value {
    match raw {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) if field_type == FieldType::Boolean => Value::Bool(i != 0),
        ValueRef::Integer(i) => Value::Number(i as f64),
        ValueRef::Real(r) => Value::Number(r),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match field_type {
                FieldType::Date | FieldType::DateTime => {
                    parse_timestamp(&text).map_or(Value::String(text), Value::Timestamp)
                }
                FieldType::Json => {
                    serde_json::from_str(&text).map_or(Value::String(text), Value::Nested)
                }
                FieldType::Boolean => match text.to_ascii_lowercase().as_str() {
                    "true" | "1" => Value::Bool(true),
                    "false" | "0" => Value::Bool(false),
                    _ => Value::String(text),
                },
                _ => Value::String(text),
            }
        }
    }
}

/// Reads the named columns of a row into a record.
pub(crate) fn row_to_record(
    row: &Row<'_>,
    schema: &ObjectMetadata,
    columns: &[String],
) -> rusqlite::Result<Record> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        let value = from_sql(row.get_ref(index)?, schema.column_type(column));
        record.insert(column.clone(), value);
    }
    Ok(record)
}

/// Comma-separated quoted column list.
pub(crate) fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}
