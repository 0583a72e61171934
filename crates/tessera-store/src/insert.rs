use crate::autonumber;
use crate::engine::RecordEngine;
use crate::error::Result;
use crate::outbox::EventType;
use crate::polymorphic;
use crate::rows;
use crate::system_fields;
use crate::uniqueness;
use chrono::Utc;
use tessera_metadata::ObjectMetadata;
use tessera_types::{Operation, Record, RequestContext, UserSession};
use tracing::info;

impl RecordEngine {
    /// Creates a record and returns it with its generated fields.
    ///
    /// # Pipeline
    ///
    /// 1. Object-level create permission.
    /// 2. Defaults, system fields, type coercion, static field checks,
    ///    password hashing.
    /// 3. In one transaction: polymorphic resolution, validation rules,
    ///    uniqueness, auto-numbers, `before_create`, the write, aggregate
    ///    recomputation and the `record.created` event.
    pub fn insert(&self, ctx: &RequestContext, object: &str, input: Record) -> Result<Record> {
        let actor = ctx.actor();
        let schema = self.schema(object)?;
        self.access.check_object(actor, &schema.api_name, Operation::Create)?;

        let mut record = self.prepare_new(&schema, input, actor, false)?;
        self.validator.check_fields(&schema, &record)?;
        self.hash_passwords(&schema, &mut record)?;

        let rules = self.metadata.get_validation_rules(&schema.api_name)?;
        let sequences = self.metadata.get_auto_numbers(&schema.api_name)?;

        let record = self.db.transaction(ctx, |tx| {
            polymorphic::resolve(tx, &schema, &mut record, &schema.fields)?;
            self.validator
                .check_rules(self.evaluator.as_ref(), &rules, &schema, &record, actor)?;
            uniqueness::check_unique(tx, &schema, &record, schema.unique_fields(), None)?;
            tx.check_cancelled()?;

            autonumber::assign(tx, &sequences, std::iter::once(&mut record))?;
            self.hooks.before_create(tx, &schema, &record, actor)?;
            rows::insert(tx, &schema, std::slice::from_ref(&record))?;
            self.aggregates.recompute(tx, &schema, &record)?;
            self.emit(tx, EventType::RecordCreated, &schema, &record, None, actor)?;
            Ok(record)
        })?;

        info!(
            object = %schema.api_name,
            record_id = record.id().unwrap_or_default(),
            user = actor.map_or("<none>", |u| u.id.as_str()),
            "Record created"
        );
        Ok(self.redact(&schema, record, actor))
    }

    /// Normalizes caller input into a complete new row, before any
    /// database checks.
    pub(crate) fn prepare_new(
        &self,
        schema: &ObjectMetadata,
        input: Record,
        actor: Option<&UserSession>,
        preserve_audit: bool,
    ) -> Result<Record> {
        let input = self.normalize(schema, input)?;
        let audit = if preserve_audit {
            self.preserved_audit(schema, &input)?
        } else {
            Vec::new()
        };

        let now = Utc::now();
        let mut record = self.writable(schema, input, actor);
        system_fields::apply_defaults(schema, &mut record, now);
        self.validator.coerce(schema, &mut record)?;
        for (column, value) in audit {
            record.insert(column, value);
        }
        system_fields::stamp_insert(schema, &mut record, actor, now, preserve_audit);
        Ok(record)
    }
}
