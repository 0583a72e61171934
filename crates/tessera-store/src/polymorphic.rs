//! Resolution of lookups that may point at more than one object.

use crate::codec::quote_ident;
use crate::error::{RecordError, Result, is_missing_table};
use rusqlite::{Connection, OptionalExtension, params};
use tessera_metadata::{FieldMetadata, ObjectMetadata};
use tessera_types::{Record, Value, system};
use tracing::debug;

/// Fills `<field>_type` for each polymorphic field with a value.
///
/// Candidates are probed in `reference_to` order. Missing tables and
/// deleted rows never match. The id must match exactly one candidate.
pub(crate) fn resolve<'a>(
    conn: &Connection,
    schema: &ObjectMetadata,
    record: &mut Record,
    fields: impl IntoIterator<Item = &'a FieldMetadata>,
) -> Result<()> {
    for field in fields.into_iter().filter(|f| f.is_polymorphic()) {
        let type_column = system::polymorphic_type_column(&field.api_name);
        let id = match record.get(&field.api_name) {
            Some(value) if !value.is_blank() => value.to_string(),
            _ => {
                record.insert(type_column, Value::Null);
                continue;
            }
        };

        let mut matches = Vec::new();
        for target in &field.reference_to {
            if row_exists(conn, target, &id)? {
                matches.push(target.clone());
            }
        }

        match matches.as_slice() {
            [target] => {
                debug!(object = %schema.api_name, field = %field.api_name, target = %target, "Polymorphic reference resolved");
                record.insert(type_column, target.clone());
            }
            [] => {
                return Err(RecordError::validation(
                    &schema.api_name,
                    Some(&field.api_name),
                    format!(
                        "field '{}' references '{id}', which was not found in {}",
                        field.api_name,
                        field.reference_to.join(", ")
                    ),
                ));
            }
            _ => {
                return Err(RecordError::validation(
                    &schema.api_name,
                    Some(&field.api_name),
                    format!(
                        "field '{}' references '{id}', which is ambiguous between {}",
                        field.api_name,
                        matches.join(", ")
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn row_exists(conn: &Connection, object: &str, id: &str) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE {} = ?1 AND {} = 0",
        quote_ident(object),
        quote_ident(system::ID),
        quote_ident(system::IS_DELETED),
    );
    match conn.query_row(&sql, params![id], |_| Ok(())).optional() {
        Ok(found) => Ok(found.is_some()),
        Err(e) if is_missing_table(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}
