//! Collaborators invoked inside mutation transactions.
//!
//! Both run on the mutation's own connection before commit. An error from
//! either aborts and rolls back the whole mutation. They are distinct from
//! the outbox, which delivers after commit and can never veto.

use crate::error::Result;
use rusqlite::Connection;
use tessera_metadata::ObjectMetadata;
use tessera_types::{Record, UserSession};

/// Synchronous pre-commit hooks. Returning an error vetoes the operation.
pub trait RecordHooks: Send + Sync {
    fn before_create(
        &self,
        _conn: &Connection,
        _schema: &ObjectMetadata,
        _record: &Record,
        _actor: Option<&UserSession>,
    ) -> Result<()> {
        Ok(())
    }

    fn before_update(
        &self,
        _conn: &Connection,
        _schema: &ObjectMetadata,
        _record: &Record,
        _old_record: &Record,
        _actor: Option<&UserSession>,
    ) -> Result<()> {
        Ok(())
    }

    fn before_delete(
        &self,
        _conn: &Connection,
        _schema: &ObjectMetadata,
        _record: &Record,
        _actor: Option<&UserSession>,
    ) -> Result<()> {
        Ok(())
    }
}

/// Recomputes rollup summaries that depend on a changed record.
///
/// Not called by bulk inserts; callers that need aggregates after a bulk
/// load trigger recomputation separately.
pub trait AggregateRecompute: Send + Sync {
    fn recompute(&self, conn: &Connection, schema: &ObjectMetadata, record: &Record)
    -> Result<()>;
}

/// Hooks that allow everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl RecordHooks for NoHooks {}

/// Recompute that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAggregates;

impl AggregateRecompute for NoAggregates {
    fn recompute(&self, _conn: &Connection, _schema: &ObjectMetadata, _record: &Record) -> Result<()> {
        Ok(())
    }
}
