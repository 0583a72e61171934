//! Permission grants.

use serde::{Deserialize, Serialize};
use tessera_metadata::{AccessLevel, ShareTarget};
use tessera_types::Operation;

/// Object-level grant held by a profile or permission set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectGrant {
    pub allow_read: bool,
    pub allow_create: bool,
    pub allow_edit: bool,
    pub allow_delete: bool,
    /// Read every record of the object.
    pub view_all: bool,
    /// Read, edit and delete every record of the object.
    pub modify_all: bool,
}

impl ObjectGrant {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        Self {
            allow_read: true,
            ..Self::default()
        }
    }

    /// Create, read and edit, but not delete.
    pub fn read_write() -> Self {
        Self {
            allow_read: true,
            allow_create: true,
            allow_edit: true,
            ..Self::default()
        }
    }

    pub fn full() -> Self {
        Self {
            allow_read: true,
            allow_create: true,
            allow_edit: true,
            allow_delete: true,
            view_all: false,
            modify_all: false,
        }
    }

    pub fn allows(self, operation: Operation) -> bool {
        match operation {
            Operation::Read => self.allow_read || self.view_all || self.modify_all,
            Operation::Create => self.allow_create,
            Operation::Edit => self.allow_edit || self.modify_all,
            Operation::Delete => self.allow_delete || self.modify_all,
        }
    }

    /// Union of two grants. Permission sets only ever add access.
    pub fn merge(self, other: Self) -> Self {
        Self {
            allow_read: self.allow_read || other.allow_read,
            allow_create: self.allow_create || other.allow_create,
            allow_edit: self.allow_edit || other.allow_edit,
            allow_delete: self.allow_delete || other.allow_delete,
            view_all: self.view_all || other.view_all,
            modify_all: self.modify_all || other.modify_all,
        }
    }
}

/// Field-level grant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldGrant {
    pub readable: bool,
    pub editable: bool,
}

impl FieldGrant {
    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn read_only() -> Self {
        Self {
            readable: true,
            editable: false,
        }
    }

    pub fn editable() -> Self {
        Self {
            readable: true,
            editable: true,
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            readable: self.readable || other.readable,
            editable: self.editable || other.editable,
        }
    }
}

/// Object name pattern for grants.
///
/// Supports wildcards:
/// - `*` matches all objects
/// - `sales_*` matches objects starting with `sales_`
/// - `*_history` matches objects ending with `_history`
///
/// Matching is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectPattern(String);

impl ObjectPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into().to_ascii_lowercase())
    }

    pub fn is_exact(&self) -> bool {
        !self.0.contains('*')
    }

    pub fn matches(&self, object: &str) -> bool {
        let pattern = &self.0;
        let object = object.to_ascii_lowercase();

        if pattern == "*" {
            return true;
        }

        if let Some(prefix) = pattern.strip_suffix('*') {
            return object.starts_with(prefix);
        }

        if let Some(suffix) = pattern.strip_prefix('*') {
            return object.ends_with(suffix);
        }

        object == *pattern
    }
}

/// An explicit share of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordShare {
    pub share_with: ShareTarget,
    pub access_level: AccessLevel,
}

impl RecordShare {
    pub fn new(share_with: ShareTarget, access_level: AccessLevel) -> Self {
        Self {
            share_with,
            access_level,
        }
    }
}
