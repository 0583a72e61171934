use crate::engine::{RecordEngine, not_found};
use crate::error::Result;
use crate::history;
use crate::outbox::EventType;
use crate::polymorphic;
use crate::rows::{self, Visibility};
use crate::system_fields;
use crate::uniqueness;
use chrono::Utc;
use tessera_metadata::FieldMetadata;
use tessera_types::{Operation, Record, RequestContext};
use tracing::{debug, info};

impl RecordEngine {
    /// Merges `input` into an existing live record and returns the result.
    ///
    /// Read-only fields and fields the actor cannot edit are skipped. Only
    /// values that differ from the stored row are written; when nothing
    /// differs the call succeeds without touching the row.
    pub fn update(&self, ctx: &RequestContext, object: &str, id: &str, input: Record) -> Result<Record> {
        let actor = ctx.actor();
        let schema = self.schema(object)?;
        self.access.check_object(actor, &schema.api_name, Operation::Edit)?;

        let input = self.normalize(&schema, input)?;
        let mut requested = self.writable(&schema, input, actor);
        self.validator.coerce(&schema, &mut requested)?;
        self.hash_passwords(&schema, &mut requested)?;
        let rules = self.metadata.get_validation_rules(&schema.api_name)?;

        let (record, changed) = self.db.transaction(ctx, |tx| {
            let old = rows::load(tx, &schema, id, Visibility::Live)?.ok_or_else(|| not_found(&schema, id))?;
            self.access.check_record(actor, &schema, &old, Operation::Edit)?;

            let changes: Record = requested
                .into_iter()
                .filter(|(key, value)| old.get(key) != Some(value))
                .collect();
            if changes.is_empty() {
                debug!(object = %schema.api_name, record_id = %id, "Update changes nothing");
                return Ok((old, Vec::new()));
            }

            let mut merged = old.clone();
            for (key, value) in &changes {
                merged.insert(key.clone(), value.clone());
            }
            system_fields::copy_name(&schema, &mut merged);
            system_fields::stamp_update(&mut merged, actor, Utc::now());

            let changed_fields: Vec<&FieldMetadata> = schema
                .fields
                .iter()
                .filter(|field| changes.contains(&field.api_name))
                .collect();
            polymorphic::resolve(tx, &schema, &mut merged, changed_fields.iter().copied())?;
            self.validator.check_fields(&schema, &merged)?;
            self.validator
                .check_rules(self.evaluator.as_ref(), &rules, &schema, &merged, actor)?;
            uniqueness::check_unique(
                tx,
                &schema,
                &merged,
                changed_fields.iter().copied().filter(|field| field.unique),
                Some(id),
            )?;
            tx.check_cancelled()?;

            self.hooks.before_update(tx, &schema, &merged, &old, actor)?;
            let writes: Record = merged
                .iter()
                .filter(|(key, value)| old.get(key) != Some(*value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            rows::update(tx, &schema, id, &writes)?;
            history::record_changes(tx, &schema, id, &old, &changes, actor, Utc::now())?;
            self.aggregates.recompute(tx, &schema, &merged)?;
            self.emit(tx, EventType::RecordUpdated, &schema, &merged, Some(&old), actor)?;

            Ok((merged, changes.keys().cloned().collect::<Vec<_>>()))
        })?;

        if !changed.is_empty() {
            info!(
                object = %schema.api_name,
                record_id = %id,
                fields = ?changed,
                user = actor.map_or("<none>", |u| u.id.as_str()),
                "Record updated"
            );
        }
        Ok(self.redact(&schema, record, actor))
    }
}
