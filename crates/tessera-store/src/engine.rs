//! The record mutation engine.
//!
//! `RecordEngine` ties metadata, access control, validation and storage
//! together. Operations live in their own modules:
//!
//! | Operation | Module |
//! |-----------|--------|
//! | `insert` | `insert.rs` |
//! | `update` | `update.rs` |
//! | `delete`, `restore`, `purge` | `delete.rs` |
//! | `bulk_insert` | `bulk.rs` |
//!
//! Every mutation runs in one immediate transaction. Validation, hooks,
//! the row write, aggregate recomputation and the outbox event either all
//! commit or all roll back.

use crate::codec::parse_timestamp;
use crate::db::Database;
use crate::error::{RecordError, Result};
use crate::history::{self, FieldChange};
use crate::hooks::{AggregateRecompute, NoAggregates, NoHooks, RecordHooks};
use crate::outbox::{EventType, Outbox, RecordEventPayload};
use crate::password;
use crate::recycle_bin::{self, RecycleBinEntry, RecycleBinScope};
use crate::rows::{self, Visibility};
use crate::validation::Validator;
use rusqlite::Connection;
use std::sync::Arc;
use tessera_access::AccessController;
use tessera_expr::{Evaluator, ExpressionEvaluator};
use tessera_metadata::{FieldType, MetadataCache, ObjectMetadata};
use tessera_types::{Operation, Record, RequestContext, UserSession, Value, system};
use tracing::debug;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Recorded as the deleter when a deletion has no acting user name.
    pub system_user_name: String,
    /// Rows per multi-row INSERT in bulk inserts.
    pub bulk_batch_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            system_user_name: "System".to_string(),
            bulk_batch_size: 100,
        }
    }
}

/// Metadata-driven record mutations.
pub struct RecordEngine {
    pub(crate) db: Arc<Database>,
    pub(crate) metadata: Arc<MetadataCache>,
    pub(crate) access: Arc<AccessController>,
    pub(crate) evaluator: Arc<dyn Evaluator>,
    pub(crate) hooks: Arc<dyn RecordHooks>,
    pub(crate) aggregates: Arc<dyn AggregateRecompute>,
    pub(crate) validator: Validator,
    pub(crate) options: EngineOptions,
}

impl RecordEngine {
    pub fn new(db: Arc<Database>, metadata: Arc<MetadataCache>, access: Arc<AccessController>) -> Self {
        Self {
            db,
            metadata,
            access,
            evaluator: Arc::new(ExpressionEvaluator::new()),
            hooks: Arc::new(NoHooks),
            aggregates: Arc::new(NoAggregates),
            validator: Validator::new(),
            options: EngineOptions::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RecordHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_aggregates(mut self, aggregates: Arc<dyn AggregateRecompute>) -> Self {
        self.aggregates = aggregates;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    pub fn access(&self) -> &Arc<AccessController> {
        &self.access
    }

    /// Loads a live record the actor may read, without hidden fields.
    pub fn get(&self, ctx: &RequestContext, object: &str, id: &str) -> Result<Record> {
        let actor = ctx.actor();
        let schema = self.schema(object)?;
        self.access.check_object(actor, &schema.api_name, Operation::Read)?;

        let record = self
            .db
            .read(ctx, |conn| rows::load(conn, &schema, id, Visibility::Live))?
            .ok_or_else(|| not_found(&schema, id))?;
        self.access.check_record(actor, &schema, &record, Operation::Read)?;
        Ok(self.redact(&schema, record, actor))
    }

    /// Changes to tracked fields of a record the actor may read.
    pub fn field_history(&self, ctx: &RequestContext, object: &str, id: &str) -> Result<Vec<FieldChange>> {
        let actor = ctx.actor();
        let schema = self.schema(object)?;
        self.access.check_object(actor, &schema.api_name, Operation::Read)?;

        self.db.snapshot(ctx, |conn| {
            let record = rows::load(conn, &schema, id, Visibility::Any)?.ok_or_else(|| not_found(&schema, id))?;
            self.access.check_record(actor, &schema, &record, Operation::Read)?;
            let changes = history::load(conn, &schema.api_name, id)?;
            Ok(changes
                .into_iter()
                .filter(|change| self.access.can_view_field(actor, &schema, &change.field_api_name))
                .collect())
        })
    }

    /// Lists recycle-bin entries. `All` needs a super-user.
    pub fn recycle_bin(&self, ctx: &RequestContext, scope: RecycleBinScope) -> Result<Vec<RecycleBinEntry>> {
        let actor = ctx
            .actor()
            .ok_or_else(|| RecordError::Forbidden("the recycle bin requires a user".to_string()))?;
        let deleted_by = match scope {
            RecycleBinScope::Mine => Some(actor.id.as_str()),
            RecycleBinScope::All if self.access.is_super_user(Some(actor)) => None,
            RecycleBinScope::All => {
                return Err(RecordError::Forbidden(
                    "only administrators can view every recycle bin entry".to_string(),
                ));
            }
        };
        self.db.read(ctx, |conn| recycle_bin::list(conn, deleted_by))
    }

    // ========================================================================
    // Shared pipeline steps
    // ========================================================================

    pub(crate) fn schema(&self, object: &str) -> Result<Arc<ObjectMetadata>> {
        self.metadata
            .get_schema(object)?
            .ok_or_else(|| RecordError::UnknownObject(object.to_string()))
    }

    /// Maps input keys to their canonical spelling. Unknown keys fail.
    pub(crate) fn normalize(&self, schema: &ObjectMetadata, input: Record) -> Result<Record> {
        let mut normalized = Record::new();
        for (key, value) in input {
            let canonical = if let Some(field) = schema.field(&key) {
                field.api_name.clone()
            } else if let Some(column) = system_column(&key) {
                column.to_string()
            } else if let Some(column) = polymorphic_type_column(schema, &key) {
                column
            } else {
                return Err(RecordError::validation(
                    &schema.api_name,
                    Some(&key),
                    format!("unknown field '{key}'"),
                ));
            };
            normalized.insert(canonical, value);
        }
        Ok(normalized)
    }

    /// Keeps the values the caller may write: no read-only or
    /// engine-managed columns, no fields the actor cannot edit.
    pub(crate) fn writable(&self, schema: &ObjectMetadata, input: Record, actor: Option<&UserSession>) -> Record {
        input
            .into_iter()
            .filter(|(key, _)| match schema.field(key) {
                Some(field) if field.is_read_only() => {
                    debug!(object = %schema.api_name, field = %key, "Skipping read-only field");
                    false
                }
                Some(_) if !self.access.can_edit_field(actor, schema, key) => {
                    debug!(object = %schema.api_name, field = %key, "Skipping field the actor cannot edit");
                    false
                }
                Some(_) => true,
                None => key == system::NAME,
            })
            .collect()
    }

    /// Extracts caller-supplied audit values for administrative imports.
    pub(crate) fn preserved_audit(&self, schema: &ObjectMetadata, input: &Record) -> Result<Vec<(&'static str, Value)>> {
        let mut preserved = Vec::new();
        for column in system::AUDIT_FIELDS {
            let Some(value) = input.get(column).filter(|v| !v.is_blank()) else {
                continue;
            };
            let value = match value {
                Value::String(text) if schema.column_type(column).is_temporal() => parse_timestamp(text)
                    .map(Value::Timestamp)
                    .ok_or_else(|| {
                        RecordError::validation(&schema.api_name, Some(column), format!("field '{column}' expects a date"))
                    })?,
                other => other.clone(),
            };
            preserved.push((column, value));
        }
        Ok(preserved)
    }

    pub(crate) fn hash_passwords(&self, schema: &ObjectMetadata, record: &mut Record) -> Result<()> {
        for field in schema.fields.iter().filter(|f| f.field_type == FieldType::Password) {
            let plain = match record.get(&field.api_name) {
                Some(Value::String(plain)) if !plain.is_empty() => plain.clone(),
                _ => continue,
            };
            record.insert(field.api_name.clone(), password::hash_if_needed(&plain)?);
        }
        Ok(())
    }

    /// Removes fields the actor cannot see.
    pub(crate) fn redact(&self, schema: &ObjectMetadata, mut record: Record, actor: Option<&UserSession>) -> Record {
        if self.access.is_super_user(actor) {
            return record;
        }
        let hidden: Vec<String> = record
            .keys()
            .filter(|key| {
                schema.field(key).is_some_and(|field| !field.is_system)
                    && !self.access.can_view_field(actor, schema, key)
            })
            .cloned()
            .collect();
        for key in hidden {
            record.remove(&key);
        }
        record
    }

    pub(crate) fn emit(
        &self,
        conn: &Connection,
        event_type: EventType,
        schema: &ObjectMetadata,
        record: &Record,
        old_record: Option<&Record>,
        actor: Option<&UserSession>,
    ) -> Result<()> {
        let payload = RecordEventPayload {
            object_api_name: schema.api_name.clone(),
            record: record.clone(),
            old_record: old_record.cloned(),
            current_user: actor.cloned(),
        };
        Outbox::enqueue(conn, event_type, &payload)?;
        Ok(())
    }
}

impl std::fmt::Debug for RecordEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordEngine")
            .field("db", &self.db)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

pub(crate) fn not_found(schema: &ObjectMetadata, id: &str) -> RecordError {
    RecordError::NotFound {
        object: schema.api_name.clone(),
        id: id.to_string(),
    }
}

fn system_column(key: &str) -> Option<&'static str> {
    [
        system::ID,
        system::NAME,
        system::OWNER_ID,
        system::CREATED_BY_ID,
        system::CREATED_DATE,
        system::LAST_MODIFIED_BY_ID,
        system::LAST_MODIFIED_DATE,
        system::IS_DELETED,
    ]
    .into_iter()
    .find(|column| column.eq_ignore_ascii_case(key))
}

fn polymorphic_type_column(schema: &ObjectMetadata, key: &str) -> Option<String> {
    let lower = key.to_ascii_lowercase();
    let base = lower.strip_suffix(system::POLYMORPHIC_TYPE_SUFFIX)?;
    schema
        .field(base)
        .filter(|field| field.is_polymorphic())
        .map(|field| system::polymorphic_type_column(&field.api_name))
}
