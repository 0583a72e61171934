//! # tessera-types: Core types for `Tessera`
//!
//! This crate contains shared types used across the `Tessera` system:
//! - Dynamic field values ([`Value`]) and generic records ([`Record`])
//! - Actor identity ([`UserSession`]) and per-request state ([`RequestContext`])
//! - Cooperative cancellation ([`CancelToken`], [`Cancelled`])
//! - Access operations ([`Operation`])
//! - Reserved field and table names ([`system`], [`tables`])

mod cancel;
mod record;
mod session;
mod value;

pub use cancel::{CancelToken, Cancelled};
pub use record::Record;
pub use session::{RequestContext, UserSession};
pub use value::Value;

use serde::{Deserialize, Serialize};
use std::fmt::Display;

// ============================================================================
// Operations
// ============================================================================

/// An operation an actor can attempt on an object or a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Read,
    Edit,
    Delete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Edit => "edit",
            Operation::Delete => "delete",
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Reserved names
// ============================================================================

/// Standard system columns carried by every mutable object table.
pub mod system {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const OWNER_ID: &str = "owner_id";
    pub const CREATED_BY_ID: &str = "created_by_id";
    pub const CREATED_DATE: &str = "created_date";
    pub const LAST_MODIFIED_BY_ID: &str = "last_modified_by_id";
    pub const LAST_MODIFIED_DATE: &str = "last_modified_date";
    pub const IS_DELETED: &str = "is_deleted";

    /// Fields the engine generates itself. `name` is a system column but
    /// remains caller-writable, so it is not listed here.
    pub const GENERATED_FIELDS: [&str; 7] = [
        ID,
        OWNER_ID,
        CREATED_BY_ID,
        CREATED_DATE,
        LAST_MODIFIED_BY_ID,
        LAST_MODIFIED_DATE,
        IS_DELETED,
    ];

    /// Audit columns a super-user may carry over during a bulk import.
    pub const AUDIT_FIELDS: [&str; 4] = [
        CREATED_BY_ID,
        CREATED_DATE,
        LAST_MODIFIED_BY_ID,
        LAST_MODIFIED_DATE,
    ];

    /// Suffix of the companion column that records a polymorphic target.
    pub const POLYMORPHIC_TYPE_SUFFIX: &str = "_type";

    /// Default value token resolved to the current time.
    pub const CURRENT_TIMESTAMP: &str = "CURRENT_TIMESTAMP";

    /// Returns true for engine-generated system fields (case-insensitive).
    pub fn is_generated_field(name: &str) -> bool {
        GENERATED_FIELDS
            .iter()
            .any(|field| field.eq_ignore_ascii_case(name))
    }

    /// Name of the companion type column for a polymorphic field.
    pub fn polymorphic_type_column(field: &str) -> String {
        format!("{field}{POLYMORPHIC_TYPE_SUFFIX}")
    }
}

/// Engine-owned tables.
pub mod tables {
    pub const RECYCLE_BIN: &str = "_recycle_bin";
    pub const AUTO_NUMBER: &str = "_auto_number";
    pub const OUTBOX: &str = "_outbox_event";
    pub const FIELD_HISTORY: &str = "_field_history";
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("id", true)]
    #[test_case("OWNER_ID", true)]
    #[test_case("is_deleted", true)]
    #[test_case("name", false)]
    #[test_case("industry", false)]
    fn test_generated_fields(name: &str, expected: bool) {
        assert_eq!(system::is_generated_field(name), expected);
    }

    #[test]
    fn test_polymorphic_type_column() {
        assert_eq!(system::polymorphic_type_column("what_id"), "what_id_type");
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Delete.to_string(), "delete");
        let json = serde_json::to_string(&Operation::Edit).unwrap();
        assert_eq!(json, "\"edit\"");
    }
}
