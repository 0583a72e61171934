//! # tessera-query: Row-level security for ad-hoc SQL
//!
//! Analytical reads bypass the mutation engine, so they are gated here
//! against the same [`AccessController`](tessera_access::AccessController).
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  SELECT name FROM account            │
//! └──────────────────┬───────────────────┘
//!                    │ SqlFrontend::parse
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │  RowLevelSecurity                    │
//! │  - single read-only statement        │
//! │  - object read on every table        │
//! │  - field visibility on every column  │
//! │  - inject ownership predicate        │
//! └──────────────────┬───────────────────┘
//!                    │ SqlFrontend::serialize
//!                    ▼
//! ┌──────────────────────────────────────┐
//! │  SELECT name FROM account            │
//! │  WHERE owner_id = 'u1'               │
//! └──────────────────────────────────────┘
//! ```
//!
//! Predicate injection only applies when the query reads from exactly one
//! named table. Joins and derived tables pass through unfiltered unless
//! [`RowLevelSecurity::reject_unresolved_sources`] is enabled.

mod error;
mod frontend;
mod rls;

pub use error::{Result, RlsError};
pub use frontend::{ColumnRef, ColumnSource, SqlDialect, SqlFrontend, SqlparserFrontend, TableTarget};
pub use rls::RowLevelSecurity;
