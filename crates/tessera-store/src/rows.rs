//! Physical row access for object tables.

use crate::codec::{column_list, format_timestamp, quote_ident, row_to_record, to_sql};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tessera_metadata::ObjectMetadata;
use tessera_types::{Record, UserSession, system};

/// Whether a lookup sees soft-deleted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visibility {
    Live,
    Any,
}

pub(crate) fn load(
    conn: &Connection,
    schema: &ObjectMetadata,
    id: &str,
    visibility: Visibility,
) -> Result<Option<Record>> {
    let columns = schema.storage_columns();
    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        column_list(&columns),
        quote_ident(&schema.api_name),
        quote_ident(system::ID),
    );
    if visibility == Visibility::Live {
        sql.push_str(&format!(" AND {} = 0", quote_ident(system::IS_DELETED)));
    }
    Ok(conn
        .query_row(&sql, params![id], |row| row_to_record(row, schema, &columns))
        .optional()?)
}

/// Inserts records with one multi-row statement.
pub(crate) fn insert(conn: &Connection, schema: &ObjectMetadata, records: &[Record]) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }
    let columns = schema.storage_columns();
    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    let sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(&schema.api_name),
        column_list(&columns),
        vec![placeholders; records.len()].join(", "),
    );

    let values: Vec<SqlValue> = records
        .iter()
        .flat_map(|record| {
            columns.iter().map(move |column| {
                record
                    .get(column)
                    .map_or(SqlValue::Null, |value| to_sql(value, schema.column_type(column)))
            })
        })
        .collect();
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

/// Writes `changes` to one row. Keys must be storage columns.
pub(crate) fn update(conn: &Connection, schema: &ObjectMetadata, id: &str, changes: &Record) -> Result<usize> {
    if changes.is_empty() {
        return Ok(0);
    }
    let mut assignments = Vec::with_capacity(changes.len());
    let mut values = Vec::with_capacity(changes.len() + 1);
    for (column, value) in changes {
        assignments.push(format!("{} = ?", quote_ident(column)));
        values.push(to_sql(value, schema.column_type(column)));
    }
    values.push(SqlValue::Text(id.to_string()));

    let sql = format!(
        "UPDATE {} SET {} WHERE {} = ?",
        quote_ident(&schema.api_name),
        assignments.join(", "),
        quote_ident(system::ID),
    );
    Ok(conn.execute(&sql, params_from_iter(values))?)
}

/// Sets or clears the deleted flag and touches the audit columns.
pub(crate) fn set_deleted(
    conn: &Connection,
    schema: &ObjectMetadata,
    id: &str,
    deleted: bool,
    actor: Option<&UserSession>,
    now: DateTime<Utc>,
) -> Result<usize> {
    let sql = format!(
        "UPDATE {} SET {} = ?1, {} = ?2, {} = ?3 WHERE {} = ?4",
        quote_ident(&schema.api_name),
        quote_ident(system::IS_DELETED),
        quote_ident(system::LAST_MODIFIED_BY_ID),
        quote_ident(system::LAST_MODIFIED_DATE),
        quote_ident(system::ID),
    );
    Ok(conn.execute(
        &sql,
        params![
            i64::from(deleted),
            actor.map(|user| user.id.as_str()),
            format_timestamp(&now),
            id
        ],
    )?)
}

/// Removes a row physically.
pub(crate) fn purge(conn: &Connection, schema: &ObjectMetadata, id: &str) -> Result<usize> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_ident(&schema.api_name),
        quote_ident(system::ID)
    );
    Ok(conn.execute(&sql, params![id])?)
}

/// Ids of live rows whose `column` equals `parent_id`, optionally
/// restricted to a polymorphic type.
pub(crate) fn referencing_ids(
    conn: &Connection,
    child: &ObjectMetadata,
    column: &str,
    parent_id: &str,
    parent_type: Option<&str>,
) -> rusqlite::Result<Vec<String>> {
    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 AND {} = 0",
        quote_ident(system::ID),
        quote_ident(&child.api_name),
        quote_ident(column),
        quote_ident(system::IS_DELETED),
    );
    let mut values = vec![parent_id.to_string()];
    if let Some(parent_type) = parent_type {
        sql.push_str(&format!(
            " AND {} = ?2 COLLATE NOCASE",
            quote_ident(&system::polymorphic_type_column(column))
        ));
        values.push(parent_type.to_string());
    }
    let mut stmt = conn.prepare(&sql)?;
    let ids = stmt.query_map(params_from_iter(values), |row| row.get(0))?;
    ids.collect()
}
