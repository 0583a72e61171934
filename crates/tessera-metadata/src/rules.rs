//! Per-object rules: validation, auto-numbering, sharing.

use serde::{Deserialize, Serialize};

/// A record-level validation rule.
///
/// The condition describes the *invalid* state: a rule whose condition
/// evaluates to `true` rejects the record with `error_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub id: String,
    pub object_api_name: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub condition: String,
    pub error_message: String,
}

fn default_true() -> bool {
    true
}

impl ValidationRule {
    pub fn new(
        object_api_name: impl Into<String>,
        name: impl Into<String>,
        condition: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            object_api_name: object_api_name.into(),
            name,
            active: true,
            condition: condition.into(),
            error_message: error_message.into(),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// An auto-numbered field's sequence definition. The live counter is
/// engine-owned state, one row per (object, field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoNumberSequence {
    pub object_api_name: String,
    pub field_api_name: String,
    /// e.g. `CASE-{0000}`. The zero count inside the braces is the pad width.
    pub display_format: String,
    #[serde(default = "default_start")]
    pub starting_number: u64,
}

fn default_start() -> u64 {
    1
}

impl AutoNumberSequence {
    pub fn new(
        object_api_name: impl Into<String>,
        field_api_name: impl Into<String>,
        display_format: impl Into<String>,
    ) -> Self {
        Self {
            object_api_name: object_api_name.into(),
            field_api_name: field_api_name.into(),
            display_format: display_format.into(),
            starting_number: default_start(),
        }
    }

    pub fn starting_at(mut self, starting_number: u64) -> Self {
        self.starting_number = starting_number;
        self
    }

    /// Renders a sequence value with the display format.
    ///
    /// `CASE-{0000}` with 42 gives `CASE-0042`; `{0}` gives no padding; a
    /// format without a placeholder gets the number appended.
    pub fn format(&self, value: u64) -> String {
        let format = &self.display_format;
        if let Some(open) = format.find('{') {
            if let Some(close_offset) = format[open..].find('}') {
                let close = open + close_offset;
                let inner = &format[open + 1..close];
                if !inner.is_empty() && inner.chars().all(|c| c == '0') {
                    let width = inner.len();
                    return format!(
                        "{}{value:0width$}{}",
                        &format[..open],
                        &format[close + 1..]
                    );
                }
            }
        }
        format!("{format}{value}")
    }
}

/// Access granted by a share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    Read,
    Edit,
}

impl AccessLevel {
    /// Read grants reads; Edit grants reads and edits. Neither grants delete.
    pub fn permits(self, operation: tessera_types::Operation) -> bool {
        use tessera_types::Operation;
        match self {
            AccessLevel::Read => operation == Operation::Read,
            AccessLevel::Edit => matches!(operation, Operation::Read | Operation::Edit),
        }
    }
}

/// Identity a share is granted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ShareTarget {
    /// The role and every role below it in the hierarchy.
    Role(String),
    Group(String),
    User(String),
}

/// Extends record access to a role or group, optionally filtered by criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingRule {
    #[serde(default)]
    pub id: String,
    pub object_api_name: String,
    pub access_level: AccessLevel,
    pub share_with: ShareTarget,
    /// Boolean expression over the record. Absent, empty or `[]` matches all.
    #[serde(default)]
    pub criteria: Option<String>,
}

impl SharingRule {
    pub fn new(
        object_api_name: impl Into<String>,
        access_level: AccessLevel,
        share_with: ShareTarget,
    ) -> Self {
        Self {
            id: String::new(),
            object_api_name: object_api_name.into(),
            access_level,
            share_with,
            criteria: None,
        }
    }

    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.criteria = Some(criteria.into());
        self
    }

    /// True when the rule applies to every record of the object.
    pub fn matches_all(&self) -> bool {
        self.criteria
            .as_deref()
            .map(str::trim)
            .is_none_or(|criteria| criteria.is_empty() || criteria == "[]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::Operation;
    use test_case::test_case;

    #[test_case("CASE-{0000}", 42, "CASE-0042")]
    #[test_case("CASE-{0000}", 123_456, "CASE-123456")]
    #[test_case("INV-{0}-X", 7, "INV-7-X")]
    #[test_case("T-", 9, "T-9")]
    #[test_case("{abc}", 3, "{abc}3")]
    fn test_auto_number_format(format: &str, value: u64, expected: &str) {
        let seq = AutoNumberSequence::new("case", "case_number", format);
        assert_eq!(seq.format(value), expected);
    }

    #[test]
    fn test_access_levels() {
        assert!(AccessLevel::Read.permits(Operation::Read));
        assert!(!AccessLevel::Read.permits(Operation::Edit));
        assert!(AccessLevel::Edit.permits(Operation::Edit));
        assert!(!AccessLevel::Edit.permits(Operation::Delete));
    }

    #[test_case(None, true)]
    #[test_case(Some(""), true)]
    #[test_case(Some(" [] "), true)]
    #[test_case(Some("stage == 'Open'"), false)]
    fn test_criteria_match_all(criteria: Option<&str>, expected: bool) {
        let mut rule = SharingRule::new(
            "opportunity",
            AccessLevel::Read,
            ShareTarget::Role("r1".into()),
        );
        rule.criteria = criteria.map(ToString::to_string);
        assert_eq!(rule.matches_all(), expected);
    }

    #[test]
    fn test_share_target_serde() {
        let json = serde_json::to_value(ShareTarget::Group("g1".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "group", "id": "g1"}));
    }
}
