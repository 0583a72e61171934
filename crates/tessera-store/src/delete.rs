//! Soft delete with cascade and restrict, restore and purge.
//!
//! A delete walks an explicit worklist instead of recursing. Each item
//! re-runs the full pipeline for its own object:
//!
//! ```text
//! pop (object, id) ── visited? ──► skip
//!        │
//!        ├─ object-level delete permission
//!        ├─ load live row ── missing ──► skip (already deleted)
//!        ├─ record-level delete permission
//!        ├─ Restrict children with live rows ──► Restricted, roll back
//!        ├─ before_delete hook
//!        ├─ mark deleted, recycle-bin entry, aggregates, event
//!        └─ push Cascade children
//! ```

use crate::engine::{RecordEngine, not_found};
use crate::error::{RecordError, Result, is_missing_table};
use crate::outbox::EventType;
use crate::recycle_bin::{self, RecycleBinEntry};
use crate::rows::{self, Visibility};
use crate::system_fields;
use crate::uniqueness;
use crate::db::Tx;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tessera_metadata::{DeleteRule, ObjectMetadata};
use tessera_types::{Operation, Record, RequestContext, UserSession, system};
use tracing::{debug, info};
use uuid::Uuid;

impl RecordEngine {
    /// Soft-deletes a record and cascades to its dependents.
    ///
    /// Deleting a missing or already-deleted record succeeds and changes
    /// nothing. Returns the number of records deleted, cascades included.
    pub fn delete(&self, ctx: &RequestContext, object: &str, id: &str) -> Result<usize> {
        let actor = ctx.actor();
        let schema = self.schema(object)?;
        self.access.check_object(actor, &schema.api_name, Operation::Delete)?;

        let deleted = self
            .db
            .transaction(ctx, |tx| self.delete_worklist(tx, &schema, id, actor))?;

        if deleted > 0 {
            info!(
                object = %schema.api_name,
                record_id = %id,
                deleted,
                user = actor.map_or("<none>", |u| u.id.as_str()),
                "Record deleted"
            );
        }
        Ok(deleted)
    }

    fn delete_worklist(
        &self,
        tx: &Tx<'_>,
        root: &Arc<ObjectMetadata>,
        root_id: &str,
        actor: Option<&UserSession>,
    ) -> Result<usize> {
        let mut pending = vec![(Arc::clone(root), root_id.to_string())];
        let mut visited = HashSet::new();
        let mut deleted = 0;
        let now = Utc::now();

        while let Some((schema, id)) = pending.pop() {
            if !visited.insert((schema.api_name.to_ascii_lowercase(), id.clone())) {
                continue;
            }
            tx.check_cancelled()?;
            self.access.check_object(actor, &schema.api_name, Operation::Delete)?;

            let Some(mut record) = rows::load(tx, &schema, &id, Visibility::Live)? else {
                debug!(object = %schema.api_name, record_id = %id, "Already deleted");
                continue;
            };
            self.access.check_record(actor, &schema, &record, Operation::Delete)?;

            let cascades = self.dependents(tx, &schema, &id)?;
            self.hooks.before_delete(tx, &schema, &record, actor)?;

            rows::set_deleted(tx, &schema, &id, true, actor, now)?;
            recycle_bin::add(
                tx,
                &RecycleBinEntry {
                    id: Uuid::new_v4().to_string(),
                    record_id: id.clone(),
                    object_api_name: schema.api_name.clone(),
                    record_name: system_fields::display_name(&schema, &record),
                    deleted_by_id: actor.map(|user| user.id.clone()),
                    deleted_by: actor
                        .map(|user| user.name.clone())
                        .filter(|name| !name.is_empty())
                        .unwrap_or_else(|| self.options.system_user_name.clone()),
                    deleted_date: now,
                },
            )?;

            record.insert(system::IS_DELETED, true);
            system_fields::stamp_update(&mut record, actor, now);
            self.aggregates.recompute(tx, &schema, &record)?;
            self.emit(tx, EventType::RecordDeleted, &schema, &record, None, actor)?;

            if !cascades.is_empty() {
                debug!(object = %schema.api_name, record_id = %id, children = cascades.len(), "Cascading delete");
            }
            pending.extend(cascades);
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Live rows that reference `(schema, id)` and cascade. Fails if any
    /// live row references it through a restricting relationship.
    fn dependents(
        &self,
        tx: &Tx<'_>,
        schema: &ObjectMetadata,
        id: &str,
    ) -> Result<Vec<(Arc<ObjectMetadata>, String)>> {
        let mut cascades = Vec::new();
        for child in self.metadata.get_child_relationships(&schema.api_name)? {
            for field in child.fields_referencing(&schema.api_name) {
                let Some(rule) = field.effective_delete_rule() else {
                    continue;
                };
                let parent_type = field.is_polymorphic().then_some(schema.api_name.as_str());
                let ids = match rows::referencing_ids(tx, &child, &field.api_name, id, parent_type) {
                    Ok(ids) => ids,
                    Err(e) if is_missing_table(&e) => {
                        debug!(child = %child.api_name, "Child table missing, skipping");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                if ids.is_empty() {
                    continue;
                }
                match rule {
                    DeleteRule::Restrict => {
                        return Err(RecordError::Restricted {
                            object: schema.api_name.clone(),
                            relationship: child.display_plural().to_string(),
                        });
                    }
                    DeleteRule::Cascade => {
                        cascades.extend(ids.into_iter().map(|child_id| (Arc::clone(&child), child_id)));
                    }
                }
            }
        }
        Ok(cascades)
    }

    /// Brings a soft-deleted record back. Needs delete permission.
    ///
    /// Restoring a live record is a no-op. Unique values must still be
    /// free. Cascaded dependents are restored separately.
    pub fn restore(&self, ctx: &RequestContext, object: &str, id: &str) -> Result<Record> {
        let actor = ctx.actor();
        let schema = self.schema(object)?;
        self.access.check_object(actor, &schema.api_name, Operation::Delete)?;

        let (record, restored) = self.db.transaction(ctx, |tx| {
            let mut record = rows::load(tx, &schema, id, Visibility::Any)?.ok_or_else(|| not_found(&schema, id))?;
            self.access.check_record(actor, &schema, &record, Operation::Delete)?;
            if record.get(system::IS_DELETED).and_then(|v| v.as_bool()) != Some(true) {
                return Ok((record, false));
            }

            uniqueness::check_unique(tx, &schema, &record, schema.unique_fields(), Some(id))?;
            let now = Utc::now();
            rows::set_deleted(tx, &schema, id, false, actor, now)?;
            recycle_bin::remove(tx, &schema.api_name, id)?;

            record.insert(system::IS_DELETED, false);
            system_fields::stamp_update(&mut record, actor, now);
            self.aggregates.recompute(tx, &schema, &record)?;
            self.emit(tx, EventType::RecordRestored, &schema, &record, None, actor)?;
            Ok((record, true))
        })?;

        if restored {
            info!(object = %schema.api_name, record_id = %id, "Record restored");
        }
        Ok(self.redact(&schema, record, actor))
    }

    /// Permanently removes a record from the recycle bin.
    ///
    /// Allowed for super-users and for the user who deleted it.
    pub fn purge(&self, ctx: &RequestContext, object: &str, id: &str) -> Result<()> {
        let actor = ctx.actor();
        let schema = self.schema(object)?;

        self.db.transaction(ctx, |tx| {
            let entry = recycle_bin::find(tx, &schema.api_name, id)?.ok_or_else(|| not_found(&schema, id))?;
            let is_deleter = actor.is_some_and(|user| entry.deleted_by_id.as_deref() == Some(user.id.as_str()));
            if !is_deleter && !self.access.is_super_user(actor) {
                return Err(RecordError::Forbidden(format!(
                    "only the user who deleted record '{id}' or an administrator can purge it"
                )));
            }
            rows::purge(tx, &schema, id)?;
            recycle_bin::remove(tx, &schema.api_name, id)?;
            Ok(())
        })?;

        info!(object = %schema.api_name, record_id = %id, "Record purged");
        Ok(())
    }
}
