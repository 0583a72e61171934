//! # tessera-access: Access control
//!
//! Four independent check surfaces, composed by callers rather than folded
//! into one function:
//!
//! - **Object-level**: does the actor's profile grant `Create`/`Read`/`Edit`/`Delete`?
//! - **Field-level**: may the actor see or edit a field? System fields are
//!   never editable, even by a super-user.
//! - **Record-level**: owner, record shares, group queues, role hierarchy
//!   and sharing rules, evaluated in priority order.
//! - **Effective schema**: the schema filtered to the fields an actor may see.
//!
//! A nil actor is denied everywhere. A configured super-user profile
//! bypasses every check except system-field editability.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tessera_access::{AccessController, InMemoryDirectory, ObjectGrant};
//! use tessera_metadata::{Catalog, MetadataCache, ObjectMetadata, StaticCatalog};
//! use tessera_types::{Operation, UserSession};
//!
//! let catalog = Catalog::new().with_object(ObjectMetadata::new("account").owned());
//! let metadata = Arc::new(MetadataCache::new(Arc::new(StaticCatalog::new(catalog))));
//! let directory = InMemoryDirectory::new()
//!     .with_object_grant("standard", "account", ObjectGrant::read_only());
//!
//! let access = AccessController::new(metadata, Arc::new(directory)).without_audit();
//! let user = UserSession::new("u1", "Ada", "standard");
//!
//! assert!(access.check_object(Some(&user), "account", Operation::Read).is_ok());
//! assert!(access.check_object(Some(&user), "account", Operation::Delete).is_err());
//! assert!(access.check_object(None, "account", Operation::Read).is_err());
//! ```

mod directory;
mod enforcement;
mod error;
mod grants;
mod hierarchy;
mod record_access;

pub use directory::{AccessDirectory, InMemoryDirectory};
pub use enforcement::{AccessController, DEFAULT_SUPER_USER_PROFILE};
pub use error::{AccessError, Result};
pub use grants::{FieldGrant, ObjectGrant, ObjectPattern, RecordShare};
pub use hierarchy::RoleHierarchy;
