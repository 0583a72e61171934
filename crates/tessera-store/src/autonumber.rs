//! Auto-number counters.
//!
//! One row per (object, field) in `_auto_number`, created lazily at
//! `starting_number - 1`. Allocation is a single `UPDATE ... RETURNING`
//! inside the caller's immediate transaction, so concurrent inserts are
//! serialized on the write lock and never share or skip a value.

use crate::error::{RecordError, Result};
use rusqlite::{Connection, params};
use tessera_metadata::AutoNumberSequence;
use tessera_types::{Record, tables};
use tracing::debug;

/// Reserves `count` consecutive values and returns the first.
pub(crate) fn allocate(conn: &Connection, sequence: &AutoNumberSequence, count: u64) -> Result<u64> {
    let object = sequence.object_api_name.to_ascii_lowercase();
    let field = sequence.field_api_name.to_ascii_lowercase();
    let initial = i64::try_from(sequence.starting_number)
        .map_err(|_| RecordError::internal("auto-number start out of range"))?
        - 1;
    let step = i64::try_from(count).map_err(|_| RecordError::internal("auto-number block too large"))?;

    conn.execute(
        &format!(
            "INSERT OR IGNORE INTO {} (object_api_name, field_api_name, current_value) VALUES (?1, ?2, ?3)",
            tables::AUTO_NUMBER
        ),
        params![object, field, initial],
    )?;
    let last: i64 = conn.query_row(
        &format!(
            "UPDATE {} SET current_value = current_value + ?3 \
             WHERE object_api_name = ?1 AND field_api_name = ?2 RETURNING current_value",
            tables::AUTO_NUMBER
        ),
        params![object, field, step],
        |row| row.get(0),
    )?;

    let first = u64::try_from(last - step + 1)
        .map_err(|_| RecordError::internal("auto-number counter is negative"))?;
    debug!(object = %object, field = %field, first, count, "Auto-numbers allocated");
    Ok(first)
}

/// Assigns one contiguous block per sequence across `records`, in order.
pub(crate) fn assign<'r>(
    conn: &Connection,
    sequences: &[AutoNumberSequence],
    records: impl IntoIterator<Item = &'r mut Record>,
) -> Result<()> {
    let mut records: Vec<&mut Record> = records.into_iter().collect();
    if records.is_empty() {
        return Ok(());
    }
    for sequence in sequences {
        let first = allocate(conn, sequence, records.len() as u64)?;
        for (offset, record) in records.iter_mut().enumerate() {
            record.insert(
                sequence.field_api_name.clone(),
                sequence.format(first + offset as u64),
            );
        }
    }
    Ok(())
}
