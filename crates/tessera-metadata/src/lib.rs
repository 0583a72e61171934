//! # tessera-metadata: Object metadata and the metadata cache
//!
//! Objects ("tables") and fields ("columns") are data. This crate holds:
//! - The schema model ([`ObjectMetadata`], [`FieldMetadata`], [`FieldType`], [`DeleteRule`])
//! - Per-object rules ([`ValidationRule`], [`AutoNumberSequence`], [`SharingRule`])
//! - Catalog sources ([`MetadataSource`], [`StaticCatalog`], [`FileCatalog`])
//! - The process-wide [`MetadataCache`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  load()   ┌──────────────────────────────┐
//! │  MetadataSource  │ ────────→ │  MetadataCache               │
//! │  (static / file) │           │  RwLock<Option<Snapshot>>    │
//! └──────────────────┘           │  get_schema / invalidate ... │
//!                                └──────────────┬───────────────┘
//!                                               │ Arc<ObjectMetadata>
//!                     ┌─────────────────────────┼──────────────────┐
//!                     ▼                         ▼                  ▼
//!              Mutation engine           Access control        RLS rewriter
//! ```

mod cache;
mod catalog;
mod error;
mod object;
mod rules;

pub use cache::MetadataCache;
pub use catalog::{Catalog, FileCatalog, MetadataSource, StaticCatalog};
pub use error::{MetadataError, Result};
pub use object::{DeleteRule, FieldMetadata, FieldType, ObjectMetadata, SharingModel};
pub use rules::{AccessLevel, AutoNumberSequence, ShareTarget, SharingRule, ValidationRule};
