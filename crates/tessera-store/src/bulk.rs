//! Batch inserts with per-record failures.

use crate::autonumber;
use crate::engine::RecordEngine;
use crate::error::{BulkFailure, ErrorKind, RecordError, Result};
use crate::outbox::EventType;
use crate::polymorphic;
use crate::rows;
use crate::uniqueness::{self, BatchUniqueness};
use serde::Serialize;
use tessera_types::{Operation, Record, RequestContext};
use tracing::{info, warn};

/// Knobs for [`RecordEngine::bulk_insert`].
#[derive(Debug, Clone, Default)]
pub struct BulkInsertOptions {
    /// Rows per INSERT statement. Defaults to the engine setting.
    pub batch_size: Option<usize>,
    /// Skips polymorphic resolution, field checks and validation rules.
    /// Uniqueness is still enforced.
    pub skip_validation: bool,
    /// Leaves auto-number fields empty.
    pub skip_auto_numbers: bool,
    /// Keeps caller-supplied audit columns. Honoured for super-users only.
    pub preserve_audit_fields: bool,
}

/// What a bulk insert persisted and what it rejected.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkInsertResult {
    pub inserted: Vec<Record>,
    pub failures: Vec<BulkFailure>,
}

impl BulkInsertResult {
    pub fn inserted_count(&self) -> usize {
        self.inserted.len()
    }
}

/// Failures that reject one record rather than the whole batch.
fn is_per_record(err: &RecordError) -> bool {
    matches!(
        err.kind(),
        ErrorKind::Validation | ErrorKind::Conflict | ErrorKind::PermissionDenied
    )
}

impl RecordEngine {
    /// Inserts many records in one transaction.
    ///
    /// Records that fail validation or uniqueness, including collisions
    /// with earlier records of the same batch, are reported by index and
    /// skipped. If every record fails the call fails with
    /// [`RecordError::BulkRejected`]. Each sequence hands out one
    /// contiguous block of auto-numbers. Aggregates are not recomputed.
    pub fn bulk_insert(
        &self,
        ctx: &RequestContext,
        object: &str,
        inputs: Vec<Record>,
        options: &BulkInsertOptions,
    ) -> Result<BulkInsertResult> {
        let actor = ctx.actor();
        let schema = self.schema(object)?;
        self.access.check_object(actor, &schema.api_name, Operation::Create)?;
        if inputs.is_empty() {
            return Ok(BulkInsertResult::default());
        }

        let preserve_audit = options.preserve_audit_fields && self.access.is_super_user(actor);
        if options.preserve_audit_fields && !preserve_audit {
            warn!(object = %schema.api_name, "Audit field preservation requires a super-user; ignoring");
        }
        let batch_size = options
            .batch_size
            .unwrap_or(self.options.bulk_batch_size)
            .max(1);
        let total = inputs.len();

        let mut failures = Vec::new();
        let mut prepared = Vec::with_capacity(total);
        for (index, input) in inputs.into_iter().enumerate() {
            let outcome = self.prepare_new(&schema, input, actor, preserve_audit).and_then(|mut record| {
                if !options.skip_validation {
                    self.validator.check_fields(&schema, &record)?;
                }
                self.hash_passwords(&schema, &mut record)?;
                Ok(record)
            });
            match outcome {
                Ok(record) => prepared.push((index, record)),
                Err(e) if is_per_record(&e) => failures.push(BulkFailure {
                    index,
                    reason: e.public_message(),
                }),
                Err(e) => return Err(e),
            }
        }
        if prepared.is_empty() {
            return Err(RecordError::BulkRejected {
                object: schema.api_name.clone(),
                failures,
            });
        }

        let rules = self.metadata.get_validation_rules(&schema.api_name)?;
        let sequences = self.metadata.get_auto_numbers(&schema.api_name)?;

        let (inserted, failures) = self.db.transaction(ctx, |tx| {
            let mut failures = failures;
            let mut batch = BatchUniqueness::default();
            let mut survivors = Vec::with_capacity(prepared.len());

            for (index, mut record) in prepared {
                tx.check_cancelled()?;
                let outcome = (|| -> Result<()> {
                    if !options.skip_validation {
                        polymorphic::resolve(tx, &schema, &mut record, &schema.fields)?;
                        self.validator
                            .check_rules(self.evaluator.as_ref(), &rules, &schema, &record, actor)?;
                    }
                    uniqueness::check_unique(tx, &schema, &record, schema.unique_fields(), None)?;
                    batch
                        .claim(&schema, &record)
                        .map_err(|message| RecordError::validation(&schema.api_name, None, message))?;
                    self.hooks.before_create(tx, &schema, &record, actor)
                })();
                match outcome {
                    Ok(()) => survivors.push(record),
                    Err(e) if is_per_record(&e) => failures.push(BulkFailure {
                        index,
                        reason: e.public_message(),
                    }),
                    Err(e) => return Err(e),
                }
            }

            failures.sort_by_key(|failure| failure.index);
            if survivors.is_empty() {
                return Err(RecordError::BulkRejected {
                    object: schema.api_name.clone(),
                    failures,
                });
            }

            if !options.skip_auto_numbers {
                autonumber::assign(tx, &sequences, survivors.iter_mut())?;
            }
            for chunk in survivors.chunks(batch_size) {
                tx.check_cancelled()?;
                rows::insert(tx, &schema, chunk)?;
            }
            for record in &survivors {
                self.emit(tx, EventType::RecordCreated, &schema, record, None, actor)?;
            }
            Ok((survivors, failures))
        })?;

        info!(
            object = %schema.api_name,
            submitted = total,
            inserted = inserted.len(),
            failed = failures.len(),
            "Bulk insert complete"
        );
        let inserted = inserted
            .into_iter()
            .map(|record| self.redact(&schema, record, actor))
            .collect();
        Ok(BulkInsertResult { inserted, failures })
    }
}
