//! Field history for tracked fields.

use crate::codec::{format_timestamp, parse_timestamp};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::Serialize;
use tessera_metadata::ObjectMetadata;
use tessera_types::{Record, UserSession, Value, tables};
use uuid::Uuid;

/// One recorded change to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub id: String,
    pub object_api_name: String,
    pub record_id: String,
    pub field_api_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub changed_by_id: Option<String>,
    pub changed_date: DateTime<Utc>,
}

fn as_text(value: Option<&Value>) -> Option<String> {
    value.filter(|v| !v.is_null()).map(ToString::to_string)
}

/// Writes a history row for every changed field marked for tracking.
pub(crate) fn record_changes(
    conn: &Connection,
    schema: &ObjectMetadata,
    record_id: &str,
    old: &Record,
    changes: &Record,
    actor: Option<&UserSession>,
    now: DateTime<Utc>,
) -> Result<usize> {
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO {} (id, object_api_name, record_id, field_api_name, old_value, new_value, \
         changed_by_id, changed_date) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        tables::FIELD_HISTORY
    ))?;

    let mut written = 0;
    for (key, new_value) in changes {
        let Some(field) = schema.field(key).filter(|f| f.track_history) else {
            continue;
        };
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            schema.api_name,
            record_id,
            field.api_name,
            as_text(old.get(key)),
            as_text(Some(new_value)),
            actor.map(|user| user.id.as_str()),
            format_timestamp(&now),
        ])?;
        written += 1;
    }
    Ok(written)
}

/// History for one record, oldest first.
pub(crate) fn load(conn: &Connection, object: &str, record_id: &str) -> Result<Vec<FieldChange>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, object_api_name, record_id, field_api_name, old_value, new_value, \
         changed_by_id, changed_date FROM {} \
         WHERE object_api_name = ?1 COLLATE NOCASE AND record_id = ?2 \
         ORDER BY changed_date, rowid",
        tables::FIELD_HISTORY
    ))?;
    let rows = stmt.query_map(params![object, record_id], |row| {
        let changed: String = row.get(7)?;
        Ok(FieldChange {
            id: row.get(0)?,
            object_api_name: row.get(1)?,
            record_id: row.get(2)?,
            field_api_name: row.get(3)?,
            old_value: row.get(4)?,
            new_value: row.get(5)?,
            changed_by_id: row.get(6)?,
            changed_date: parse_timestamp(&changed).unwrap_or_default(),
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
