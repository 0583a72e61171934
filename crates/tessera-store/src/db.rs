//! SQLite connection handling.
//!
//! Every write runs in a `BEGIN IMMEDIATE` transaction, which takes the
//! database write lock up front. Writers are therefore serialized: the
//! auto-number counter read-increment-write and the uniqueness
//! check-then-insert are atomic with respect to concurrent mutations.

use crate::codec::quote_ident;
use crate::error::{RecordError, Result};
use rusqlite::{Connection, TransactionBehavior};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tessera_metadata::ObjectMetadata;
use tessera_types::{CancelToken, RequestContext, system, tables};
use tracing::{debug, info};

/// Connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// How long a writer waits for the lock before failing.
    pub busy_timeout: Duration,
    /// Idle connections kept for reuse.
    pub max_idle_connections: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            max_idle_connections: 8,
        }
    }
}

/// A SQLite database file with a small pool of idle connections.
pub struct Database {
    path: PathBuf,
    options: DatabaseOptions,
    idle: Mutex<Vec<Connection>>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DatabaseOptions::default())
    }

    pub fn open_with(path: impl AsRef<Path>, options: DatabaseOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecordError::internal(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let db = Self {
            path,
            options,
            idle: Mutex::new(Vec::new()),
        };
        // Fail fast on an unusable path.
        let conn = db.connect()?;
        db.release(conn);
        info!(path = %db.path.display(), "Database opened");
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.options.busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.options.max_idle_connections {
            idle.push(conn);
        }
    }

    /// Checks out a connection. It returns to the pool when dropped.
    pub fn connection(&self) -> Result<PooledConnection<'_>> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => self.connect()?,
        };
        Ok(PooledConnection {
            db: self,
            conn: Some(conn),
        })
    }

    /// Runs `work` in one immediate transaction.
    ///
    /// An error from `work`, or cancellation before commit, rolls back.
    pub fn transaction<T>(
        &self,
        ctx: &RequestContext,
        work: impl FnOnce(&Tx<'_>) -> Result<T>,
    ) -> Result<T> {
        ctx.check_cancelled()?;
        let mut conn = self.connection()?;
        let tx = Tx {
            inner: conn.transaction_with_behavior(TransactionBehavior::Immediate)?,
            cancel: ctx.cancel_token().clone(),
        };

        let value = work(&tx)?;
        if let Err(cancelled) = tx.cancel.check() {
            debug!("Transaction cancelled before commit, rolling back");
            return Err(cancelled.into());
        }
        tx.inner.commit()?;
        Ok(value)
    }

    /// Runs read-only `work` in one deferred transaction, so every query in
    /// it sees the database as of the first read.
    pub fn snapshot<T>(
        &self,
        ctx: &RequestContext,
        work: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        ctx.check_cancelled()?;
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs read-only `work` outside a transaction.
    pub fn read<T>(
        &self,
        ctx: &RequestContext,
        work: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        ctx.check_cancelled()?;
        let conn = self.connection()?;
        work(&conn)
    }

    /// Creates the engine-owned tables.
    pub fn bootstrap(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(&bootstrap_ddl())?;
        debug!("Engine tables ready");
        Ok(())
    }

    /// Creates the physical table for an object if it does not exist.
    ///
    /// Schema evolution is out of scope: existing tables are left alone.
    pub fn ensure_object_table(&self, schema: &ObjectMetadata) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(&object_table_ddl(schema))?;
        debug!(object = %schema.api_name, "Object table ready");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A connection checked out of the pool.
pub struct PooledConnection<'a> {
    db: &'a Database,
    conn: Option<Connection>,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection taken before drop"))
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.db.release(conn);
        }
    }
}

/// An open write transaction. Derefs to the underlying connection.
pub struct Tx<'c> {
    inner: rusqlite::Transaction<'c>,
    cancel: CancelToken,
}

impl Tx<'_> {
    /// Fails once the request is cancelled. Called between statements.
    pub fn check_cancelled(&self) -> Result<()> {
        Ok(self.cancel.check()?)
    }
}

impl Deref for Tx<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.inner
    }
}

fn bootstrap_ddl() -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{recycle_bin}" (
            id TEXT PRIMARY KEY,
            record_id TEXT NOT NULL,
            object_api_name TEXT NOT NULL,
            record_name TEXT,
            deleted_by_id TEXT,
            deleted_by TEXT NOT NULL,
            deleted_date TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS "idx{recycle_bin}_record" ON "{recycle_bin}" (record_id);

        CREATE TABLE IF NOT EXISTS "{auto_number}" (
            object_api_name TEXT NOT NULL,
            field_api_name TEXT NOT NULL,
            current_value INTEGER NOT NULL,
            PRIMARY KEY (object_api_name, field_api_name)
        );

        CREATE TABLE IF NOT EXISTS "{outbox}" (
            id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_date TEXT NOT NULL,
            claimed_date TEXT,
            processed_date TEXT
        );
        CREATE INDEX IF NOT EXISTS "idx{outbox}_status" ON "{outbox}" (status, created_date);

        CREATE TABLE IF NOT EXISTS "{history}" (
            id TEXT PRIMARY KEY,
            object_api_name TEXT NOT NULL,
            record_id TEXT NOT NULL,
            field_api_name TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            changed_by_id TEXT,
            changed_date TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS "idx{history}_record" ON "{history}" (object_api_name, record_id);
        "#,
        recycle_bin = tables::RECYCLE_BIN,
        auto_number = tables::AUTO_NUMBER,
        outbox = tables::OUTBOX,
        history = tables::FIELD_HISTORY,
    )
}

/// `CREATE TABLE IF NOT EXISTS` for an object's physical columns.
pub fn object_table_ddl(schema: &ObjectMetadata) -> String {
    let columns: Vec<String> = schema
        .storage_columns()
        .iter()
        .map(|column| {
            let quoted = quote_ident(column);
            if column == system::ID {
                format!("{quoted} TEXT PRIMARY KEY")
            } else if column == system::IS_DELETED {
                format!("{quoted} INTEGER NOT NULL DEFAULT 0")
            } else {
                format!("{quoted} {}", schema.column_type(column).storage_affinity())
            }
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({});",
        quote_ident(&schema.api_name),
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_metadata::{FieldMetadata, FieldType};
    use tessera_types::Cancelled;
    use tempfile::tempdir;

    #[test]
    fn test_object_table_ddl() {
        let schema = ObjectMetadata::new("task")
            .owned()
            .with_field(FieldMetadata::new("hours", FieldType::Number))
            .with_field(FieldMetadata::lookup("what_id", ["account", "contact"]))
            .with_field(FieldMetadata::new("score", FieldType::Formula).with_formula("hours"));
        let ddl = object_table_ddl(&schema);

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"task\""));
        assert!(ddl.contains("\"id\" TEXT PRIMARY KEY"));
        assert!(ddl.contains("\"hours\" REAL"));
        assert!(ddl.contains("\"what_id_type\" TEXT"));
        assert!(ddl.contains("\"is_deleted\" INTEGER NOT NULL DEFAULT 0"));
        assert!(!ddl.contains("score"));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db")).unwrap();
        db.bootstrap().unwrap();
        let ctx = RequestContext::anonymous();

        let result: Result<()> = db.transaction(&ctx, |tx| {
            tx.execute(
                "INSERT INTO _auto_number VALUES ('a', 'b', 1)",
                [],
            )?;
            Err(RecordError::internal("boom"))
        });
        assert!(result.is_err());

        let count: i64 = db
            .read(&ctx, |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM _auto_number", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_cancelled_transaction_rolls_back() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db")).unwrap();
        db.bootstrap().unwrap();
        let token = CancelToken::new();
        let ctx = RequestContext::anonymous().with_cancel(token.clone());

        let result = db.transaction(&ctx, |tx| {
            tx.execute("INSERT INTO _auto_number VALUES ('a', 'b', 1)", [])?;
            token.cancel();
            Ok(())
        });
        assert!(matches!(result, Err(RecordError::Cancelled(Cancelled::Cancelled))));

        let count: i64 = db
            .read(&RequestContext::anonymous(), |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM _auto_number", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_snapshot_ignores_later_commits() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("snap.db")).unwrap();
        db.connection()
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();
        let ctx = RequestContext::anonymous();
        let count = |conn: &Connection| -> Result<i64> {
            Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))?)
        };

        let (before, after) = db
            .snapshot(&ctx, |conn| {
                let before = count(conn)?;
                db.transaction(&ctx, |tx| {
                    tx.execute("INSERT INTO t VALUES (2)", [])?;
                    Ok(())
                })?;
                Ok((before, count(conn)?))
            })
            .unwrap();
        assert_eq!((before, after), (1, 1));
        assert_eq!(db.read(&ctx, count).unwrap(), 2);
    }

    #[test]
    fn test_connections_are_reused() {
        let dir = tempdir().unwrap();
        let db = Database::open_with(
            dir.path().join("nested/dir/t.db"),
            DatabaseOptions {
                max_idle_connections: 1,
                ..DatabaseOptions::default()
            },
        )
        .unwrap();
        {
            let _a = db.connection().unwrap();
            let _b = db.connection().unwrap();
        }
        assert_eq!(db.idle.lock().unwrap().len(), 1);
    }
}
