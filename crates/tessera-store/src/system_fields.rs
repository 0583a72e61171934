//! Defaults and engine-generated columns.

use crate::codec::parse_timestamp;
use chrono::{DateTime, Utc};
use tessera_metadata::{FieldType, ObjectMetadata};
use tessera_types::{Record, UserSession, Value, system};
use uuid::Uuid;

/// Fills absent or null fields from their literal defaults.
///
/// `CURRENT_TIMESTAMP` resolves to `now`. Other literals are converted to
/// the field's type; a literal that does not convert is kept as text and
/// left to validation.
pub(crate) fn apply_defaults(schema: &ObjectMetadata, record: &mut Record, now: DateTime<Utc>) {
    for field in &schema.fields {
        let Some(default) = field.default_value.as_deref() else {
            continue;
        };
        if field.is_read_only() || record.get(&field.api_name).is_some_and(|v| !v.is_null()) {
            continue;
        }
        let value = if default.eq_ignore_ascii_case(system::CURRENT_TIMESTAMP) {
            Value::Timestamp(now)
        } else {
            default_literal(default, field.field_type)
        };
        record.insert(field.api_name.clone(), value);
    }
}

fn default_literal(raw: &str, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => Value::from(raw),
        },
        t if t.is_numeric() => raw.trim().parse::<f64>().map_or_else(|_| Value::from(raw), Value::Number),
        t if t.is_temporal() => parse_timestamp(raw).map_or_else(|| Value::from(raw), Value::Timestamp),
        _ => Value::from(raw),
    }
}

/// Sets id, owner, audit columns and the deleted flag for a new row.
///
/// With `preserve_audit`, caller-supplied audit values already present in
/// the record are kept.
pub(crate) fn stamp_insert(
    schema: &ObjectMetadata,
    record: &mut Record,
    actor: Option<&UserSession>,
    now: DateTime<Utc>,
    preserve_audit: bool,
) {
    let actor_id = Value::from(actor.map(|user| user.id.clone()));

    record.insert(system::ID, Uuid::new_v4().to_string());
    if schema.has_owner() {
        record.insert(system::OWNER_ID, actor_id.clone());
    }

    let stamps = [
        (system::CREATED_BY_ID, actor_id.clone()),
        (system::CREATED_DATE, Value::Timestamp(now)),
        (system::LAST_MODIFIED_BY_ID, actor_id),
        (system::LAST_MODIFIED_DATE, Value::Timestamp(now)),
    ];
    for (column, value) in stamps {
        if preserve_audit && record.get(column).is_some_and(|v| !v.is_blank()) {
            continue;
        }
        record.insert(column, value);
    }
    record.insert(system::IS_DELETED, false);
    copy_name(schema, record);
}

/// Refreshes the last-modified columns.
pub(crate) fn stamp_update(record: &mut Record, actor: Option<&UserSession>, now: DateTime<Utc>) {
    record.insert(
        system::LAST_MODIFIED_BY_ID,
        Value::from(actor.map(|user| user.id.clone())),
    );
    record.insert(system::LAST_MODIFIED_DATE, Value::Timestamp(now));
}

/// Mirrors a custom name field into the `name` column.
pub(crate) fn copy_name(schema: &ObjectMetadata, record: &mut Record) {
    if let Some(field) = schema.name_field() {
        if !field.api_name.eq_ignore_ascii_case(system::NAME) {
            let value = record.get(&field.api_name).cloned().unwrap_or_default();
            record.insert(system::NAME, value.to_string());
        }
    }
}

/// Display name for recycle-bin entries.
pub(crate) fn display_name(schema: &ObjectMetadata, record: &Record) -> Option<String> {
    schema
        .name_field()
        .and_then(|field| record.get(&field.api_name))
        .or_else(|| record.get(system::NAME))
        .filter(|value| !value.is_blank())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tessera_metadata::FieldMetadata;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn case_schema() -> ObjectMetadata {
        ObjectMetadata::new("case")
            .owned()
            .with_field(FieldMetadata::new("subject", FieldType::Text).name_field())
            .with_field(FieldMetadata::new("status", FieldType::Picklist).with_default("New"))
            .with_field(FieldMetadata::new("escalated", FieldType::Boolean).with_default("false"))
            .with_field(FieldMetadata::new("priority", FieldType::Number).with_default("3"))
            .with_field(
                FieldMetadata::new("opened_at", FieldType::DateTime)
                    .with_default("CURRENT_TIMESTAMP"),
            )
    }

    #[test]
    fn test_defaults_fill_only_missing_values() {
        let schema = case_schema();
        let mut record = Record::new().with("status", "Escalated");
        apply_defaults(&schema, &mut record, now());

        assert_eq!(record.get_str("status"), Some("Escalated"));
        assert_eq!(record.get("escalated"), Some(&Value::Bool(false)));
        assert_eq!(record.get("priority"), Some(&Value::Number(3.0)));
        assert_eq!(record.get("opened_at"), Some(&Value::Timestamp(now())));
    }

    #[test]
    fn test_stamp_insert_sets_system_fields() {
        let schema = case_schema();
        let user = UserSession::new("u1", "Ada", "standard");
        let mut record = Record::new().with("subject", "Printer on fire");
        stamp_insert(&schema, &mut record, Some(&user), now(), false);

        assert!(Uuid::parse_str(record.id().unwrap()).is_ok());
        assert_eq!(record.owner_id(), Some("u1"));
        assert_eq!(record.get_str(system::CREATED_BY_ID), Some("u1"));
        assert_eq!(record.get(system::LAST_MODIFIED_DATE), Some(&Value::Timestamp(now())));
        assert_eq!(record.get(system::IS_DELETED), Some(&Value::Bool(false)));
        assert_eq!(record.get_str(system::NAME), Some("Printer on fire"));
    }

    #[test]
    fn test_preserved_audit_values_survive() {
        let schema = case_schema();
        let user = UserSession::new("admin", "Admin", "system_admin");
        let imported = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        let mut record = Record::new()
            .with(system::CREATED_BY_ID, "legacy-user")
            .with(system::CREATED_DATE, imported);
        stamp_insert(&schema, &mut record, Some(&user), now(), true);

        assert_eq!(record.get_str(system::CREATED_BY_ID), Some("legacy-user"));
        assert_eq!(record.get(system::CREATED_DATE), Some(&Value::Timestamp(imported)));
        assert_eq!(record.get_str(system::LAST_MODIFIED_BY_ID), Some("admin"));
    }

    #[test]
    fn test_unowned_object_gets_no_owner() {
        let schema = ObjectMetadata::new("country");
        let mut record = Record::new().with("name", "Norway");
        stamp_insert(&schema, &mut record, None, now(), false);
        assert!(!record.has_owner_field());
        assert_eq!(display_name(&schema, &record).as_deref(), Some("Norway"));
    }
}
