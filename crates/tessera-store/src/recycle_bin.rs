//! Recycle bin bookkeeping for soft-deleted records.

use crate::codec::{format_timestamp, parse_timestamp};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use tessera_types::tables;

/// One soft-deleted record. `id` is the entry's own id, distinct from the
/// deleted record's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecycleBinEntry {
    pub id: String,
    pub record_id: String,
    pub object_api_name: String,
    pub record_name: Option<String>,
    pub deleted_by_id: Option<String>,
    pub deleted_by: String,
    pub deleted_date: DateTime<Utc>,
}

/// Which entries a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecycleBinScope {
    /// Entries the actor deleted.
    #[default]
    Mine,
    /// Every entry. Super-users only.
    All,
}

const COLUMNS: &str =
    "id, record_id, object_api_name, record_name, deleted_by_id, deleted_by, deleted_date";

fn from_row(row: &Row<'_>) -> rusqlite::Result<RecycleBinEntry> {
    let deleted: String = row.get(6)?;
    Ok(RecycleBinEntry {
        id: row.get(0)?,
        record_id: row.get(1)?,
        object_api_name: row.get(2)?,
        record_name: row.get(3)?,
        deleted_by_id: row.get(4)?,
        deleted_by: row.get(5)?,
        deleted_date: parse_timestamp(&deleted).unwrap_or_default(),
    })
}

pub(crate) fn add(conn: &Connection, entry: &RecycleBinEntry) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            tables::RECYCLE_BIN
        ),
        params![
            entry.id,
            entry.record_id,
            entry.object_api_name,
            entry.record_name,
            entry.deleted_by_id,
            entry.deleted_by,
            format_timestamp(&entry.deleted_date),
        ],
    )?;
    Ok(())
}

pub(crate) fn find(conn: &Connection, object: &str, record_id: &str) -> Result<Option<RecycleBinEntry>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM {} WHERE object_api_name = ?1 COLLATE NOCASE AND record_id = ?2 \
                 ORDER BY deleted_date DESC LIMIT 1",
                tables::RECYCLE_BIN
            ),
            params![object, record_id],
            from_row,
        )
        .optional()?)
}

pub(crate) fn remove(conn: &Connection, object: &str, record_id: &str) -> Result<usize> {
    Ok(conn.execute(
        &format!(
            "DELETE FROM {} WHERE object_api_name = ?1 COLLATE NOCASE AND record_id = ?2",
            tables::RECYCLE_BIN
        ),
        params![object, record_id],
    )?)
}

/// Entries newest first, optionally only those deleted by one user.
pub(crate) fn list(conn: &Connection, deleted_by_id: Option<&str>) -> Result<Vec<RecycleBinEntry>> {
    let mut sql = format!("SELECT {COLUMNS} FROM {}", tables::RECYCLE_BIN);
    if deleted_by_id.is_some() {
        sql.push_str(" WHERE deleted_by_id = ?1");
    }
    sql.push_str(" ORDER BY deleted_date DESC, rowid DESC");

    let mut stmt = conn.prepare(&sql)?;
    let entries = match deleted_by_id {
        Some(user) => stmt.query_map(params![user], from_row)?.collect::<rusqlite::Result<Vec<_>>>()?,
        None => stmt.query_map([], from_row)?.collect::<rusqlite::Result<Vec<_>>>()?,
    };
    Ok(entries)
}
