//! # tessera-store: Record mutation engine
//!
//! Metadata-driven insert, update, soft delete and bulk insert over SQLite,
//! with a transactional outbox for post-commit events.
//!
//! ```text
//!  insert / update / delete / bulk_insert
//!                    │
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │  RecordEngine                        │
//! │  - object / field / record access    │
//! │  - defaults, system fields, coercion │
//! └──────────────────┬───────────────────┘
//!                    │ BEGIN IMMEDIATE
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │  one transaction                     │
//! │  - polymorphic refs, rules, unique   │
//! │  - auto-numbers                      │
//! │  - before_* hook                     │
//! │  - row write, cascade / restrict     │
//! │  - aggregate recompute               │
//! │  - outbox event                      │
//! └──────────────────┬───────────────────┘
//!                    │ COMMIT
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │  OutboxWorker ──► Subscriber         │
//! └──────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_access::{AccessController, InMemoryDirectory};
//! use tessera_metadata::{Catalog, FieldMetadata, FieldType, MetadataCache, ObjectMetadata, StaticCatalog};
//! use tessera_store::{Database, RecordEngine};
//! use tessera_types::{Record, RequestContext, UserSession};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let account = ObjectMetadata::new("account")
//!     .owned()
//!     .with_field(FieldMetadata::new("name", FieldType::Text).required());
//! let metadata = Arc::new(MetadataCache::new(Arc::new(StaticCatalog::new(
//!     Catalog::new().with_object(account.clone()),
//! ))));
//! let access = Arc::new(AccessController::new(
//!     Arc::clone(&metadata),
//!     Arc::new(InMemoryDirectory::new()),
//! ));
//!
//! let db = Arc::new(Database::open(dir.path().join("tessera.db")).unwrap());
//! db.bootstrap().unwrap();
//! db.ensure_object_table(&account).unwrap();
//!
//! let engine = RecordEngine::new(db, metadata, access);
//! let admin = RequestContext::new(UserSession::new("u1", "Ada", "system_admin"));
//! let created = engine
//!     .insert(&admin, "account", Record::new().with("name", "Acme"))
//!     .unwrap();
//! assert_eq!(created.owner_id(), Some("u1"));
//! ```

mod autonumber;
mod bulk;
mod codec;
mod db;
mod delete;
mod engine;
mod error;
mod history;
mod hooks;
mod insert;
pub mod outbox;
mod password;
mod polymorphic;
mod recycle_bin;
mod rows;
mod system_fields;
mod uniqueness;
mod update;
mod validation;

pub use bulk::{BulkInsertOptions, BulkInsertResult};
pub use codec::{from_sql, quote_ident, to_sql};
pub use db::{Database, DatabaseOptions, PooledConnection, Tx, object_table_ddl};
pub use engine::{EngineOptions, RecordEngine};
pub use error::{BulkFailure, ErrorKind, RecordError, Result};
pub use history::FieldChange;
pub use hooks::{AggregateRecompute, NoAggregates, NoHooks, RecordHooks};
pub use outbox::{Outbox, OutboxOptions, OutboxWorker};
pub use password::{hash_if_needed, is_hashed};
pub use recycle_bin::{RecycleBinEntry, RecycleBinScope};
