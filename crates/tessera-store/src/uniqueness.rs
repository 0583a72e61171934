//! Unique field enforcement.
//!
//! Checks run inside the writer's immediate transaction, so no other
//! writer can insert the same value between the check and the write.

use crate::codec::{quote_ident, to_sql};
use crate::error::{RecordError, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{HashMap, HashSet};
use tessera_metadata::{FieldMetadata, ObjectMetadata};
use tessera_types::{Record, system};

/// Fails if a live row other than `exclude_id` already holds one of the
/// record's values for a unique field. Blank values are exempt.
pub(crate) fn check_unique<'a>(
    conn: &Connection,
    schema: &ObjectMetadata,
    record: &Record,
    fields: impl IntoIterator<Item = &'a FieldMetadata>,
    exclude_id: Option<&str>,
) -> Result<()> {
    for field in fields {
        let Some(value) = record.get(&field.api_name).filter(|v| !v.is_blank()) else {
            continue;
        };
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1 AND {} = 0 AND {} <> ?2 LIMIT 1",
            quote_ident(&schema.api_name),
            quote_ident(&field.api_name),
            quote_ident(system::IS_DELETED),
            quote_ident(system::ID),
        );
        let taken = conn
            .query_row(
                &sql,
                params![to_sql(value, field.field_type), exclude_id.unwrap_or_default()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if taken {
            return Err(RecordError::Duplicate {
                object: schema.api_name.clone(),
                field: field.api_name.clone(),
                value: value.to_string(),
            });
        }
    }
    Ok(())
}

/// Unique values already claimed by earlier records of one bulk batch.
#[derive(Debug, Default)]
pub(crate) struct BatchUniqueness {
    seen: HashMap<String, HashSet<String>>,
}

impl BatchUniqueness {
    /// Claims the record's unique values, or names the first collision.
    ///
    /// Nothing is claimed when a collision is found.
    pub(crate) fn claim(&mut self, schema: &ObjectMetadata, record: &Record) -> std::result::Result<(), String> {
        let values: Vec<(String, String)> = schema
            .unique_fields()
            .filter_map(|field| {
                record
                    .get(&field.api_name)
                    .filter(|v| !v.is_blank())
                    .map(|v| (field.api_name.to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        for (field, value) in &values {
            if self.seen.get(field).is_some_and(|set| set.contains(value)) {
                return Err(format!("duplicate value '{value}' for unique field '{field}' within batch"));
            }
        }
        for (field, value) in values {
            self.seen.entry(field).or_default().insert(value);
        }
        Ok(())
    }
}
