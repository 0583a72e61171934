//! # Tessera
//!
//! Metadata-driven record store.
//!
//! Objects and fields are data. Every mutation passes object, field and
//! record-level access checks before it touches storage, and commits
//! atomically with the event that announces it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Tessera                            │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌───────────┐  │
//! │  │ Metadata │ → │  Access  │ → │  Engine  │ → │  Outbox   │  │
//! │  │ (cache)  │   │ (checks) │   │ (SQLite) │   │ (worker)  │  │
//! │  └──────────┘   └────┬─────┘   └──────────┘   └───────────┘  │
//! │                      └──────► RLS rewriter (ad-hoc reads)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use tessera::{Record, RequestContext, Tessera, TesseraConfig, UserSession};
//!
//! let store = Tessera::open(TesseraConfig::load()?)?;
//! let ctx = RequestContext::new(UserSession::new("u1", "Ada", "system_admin"));
//!
//! let account = store.engine().insert(&ctx, "account", Record::new().with("name", "Acme"))?;
//! let sql = store.rewrite_query(&ctx, "SELECT name FROM account")?;
//! ```
//!
//! # Modules
//!
//! - **Handle**: [`Tessera`] wires configuration into every layer
//! - **Engine**: [`RecordEngine`] for insert, update, delete and bulk insert
//! - **Access**: [`AccessController`] and [`RowLevelSecurity`]
//! - **Events**: [`Outbox`], [`OutboxWorker`] and the [`Subscriber`] trait

mod error;
mod tessera;

pub use error::{Result, TesseraError};
pub use tessera::Tessera;

// Configuration
pub use tessera_config::{ConfigLoader, TesseraConfig};

// Core types
pub use tessera_types::{CancelToken, Operation, Record, RequestContext, UserSession, Value};

// Expressions
pub use tessera_expr::{EvalContext, Evaluator, ExpressionEvaluator};

// Metadata
pub use tessera_metadata::{
    AutoNumberSequence, Catalog, DeleteRule, FieldMetadata, FieldType, FileCatalog,
    MetadataCache, MetadataSource, ObjectMetadata, SharingRule, StaticCatalog, ValidationRule,
};

// Access control
pub use tessera_access::{
    AccessController, AccessDirectory, FieldGrant, InMemoryDirectory, ObjectGrant, RecordShare,
};
pub use tessera_query::{RlsError, RowLevelSecurity};

// Mutation engine
pub use tessera_store::{
    BulkInsertOptions, BulkInsertResult, ErrorKind, RecordEngine, RecordError, RecordHooks,
    RecycleBinEntry, RecycleBinScope,
};

// Outbox
pub use tessera_store::outbox::{DeliveryError, EventType, OutboxEvent, RecordEventPayload, Subscriber};
pub use tessera_store::{Outbox, OutboxWorker};
