//! Object and field schema model.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use tessera_types::system;

// ============================================================================
// Field types
// ============================================================================

/// Logical type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    TextArea,
    LongTextArea,
    RichText,
    Email,
    Phone,
    Url,
    Number,
    Currency,
    Percent,
    Boolean,
    Date,
    DateTime,
    Picklist,
    Lookup,
    #[serde(rename = "JSON", alias = "Json")]
    Json,
    AutoNumber,
    Formula,
    RollupSummary,
    Password,
}

impl FieldType {
    /// Virtual fields are computed, never stored.
    pub fn is_virtual(self) -> bool {
        matches!(self, FieldType::Formula | FieldType::RollupSummary)
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Number | FieldType::Currency | FieldType::Percent
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, FieldType::Date | FieldType::DateTime)
    }

    /// SQLite type affinity used for the physical column.
    pub fn storage_affinity(self) -> &'static str {
        match self {
            FieldType::Number | FieldType::Currency | FieldType::Percent => "REAL",
            FieldType::Boolean => "INTEGER",
            _ => "TEXT",
        }
    }
}

// ============================================================================
// Delete rules
// ============================================================================

/// What happens to dependents when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeleteRule {
    Restrict,
    Cascade,
}

impl DeleteRule {
    /// Case-insensitive parse. Metadata is authored with inconsistent
    /// casing ("cascade", "CASCADE", "Cascade"), and all of them count.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("restrict") {
            Some(DeleteRule::Restrict)
        } else if raw.eq_ignore_ascii_case("cascade") {
            Some(DeleteRule::Cascade)
        } else {
            None
        }
    }
}

impl Display for DeleteRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeleteRule::Restrict => f.write_str("Restrict"),
            DeleteRule::Cascade => f.write_str("Cascade"),
        }
    }
}

/// Object-wide default access, informational for UI layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SharingModel {
    #[default]
    Private,
    PublicRead,
    PublicReadWrite,
}

// ============================================================================
// Fields
// ============================================================================

/// Describes one field of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub api_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_name_field: bool,
    /// Target objects. More than one marks the field polymorphic.
    #[serde(default)]
    pub reference_to: Vec<String>,
    /// Raw delete rule as authored. See [`FieldMetadata::effective_delete_rule`].
    #[serde(default)]
    pub delete_rule: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub track_history: bool,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub regex_message: Option<String>,
    #[serde(default, alias = "options")]
    pub picklist_values: Vec<String>,
}

impl FieldMetadata {
    pub fn new(api_name: impl Into<String>, field_type: FieldType) -> Self {
        let api_name = api_name.into();
        Self {
            label: api_name.clone(),
            api_name,
            field_type,
            required: false,
            unique: false,
            is_system: false,
            is_name_field: false,
            reference_to: Vec::new(),
            delete_rule: None,
            default_value: None,
            formula: None,
            track_history: false,
            min_length: None,
            max_length: None,
            min_value: None,
            max_value: None,
            regex: None,
            regex_message: None,
            picklist_values: Vec::new(),
        }
    }

    /// A lookup to one or more target objects.
    pub fn lookup<I, S>(api_name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::new(api_name, FieldType::Lookup);
        field.reference_to = targets.into_iter().map(Into::into).collect();
        field
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }

    pub fn name_field(mut self) -> Self {
        self.is_name_field = true;
        self
    }

    pub fn tracked(mut self) -> Self {
        self.track_history = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_delete_rule(mut self, rule: impl Into<String>) -> Self {
        self.delete_rule = Some(rule.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_regex(mut self, pattern: impl Into<String>, message: Option<&str>) -> Self {
        self.regex = Some(pattern.into());
        self.regex_message = message.map(ToString::to_string);
        self
    }

    pub fn with_picklist<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.picklist_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_reference(&self) -> bool {
        !self.reference_to.is_empty()
    }

    pub fn is_polymorphic(&self) -> bool {
        self.reference_to.len() > 1
    }

    /// Stored fields exclude formulas and rollups.
    pub fn is_virtual(&self) -> bool {
        self.field_type.is_virtual() || self.formula.is_some()
    }

    /// System, generated, auto-numbered or computed: callers never write it.
    pub fn is_read_only(&self) -> bool {
        self.is_system
            || system::is_generated_field(&self.api_name)
            || self.field_type == FieldType::AutoNumber
            || self.is_virtual()
    }

    /// True if this field references `object` (case-insensitive).
    pub fn references(&self, object: &str) -> bool {
        self.reference_to
            .iter()
            .any(|target| target.eq_ignore_ascii_case(object))
    }

    /// The delete rule in force. A reference with no rule restricts; an
    /// unrecognized rule has no effect and yields `None`.
    pub fn effective_delete_rule(&self) -> Option<DeleteRule> {
        match &self.delete_rule {
            None => Some(DeleteRule::Restrict),
            Some(raw) => DeleteRule::parse(raw),
        }
    }
}

// ============================================================================
// Objects
// ============================================================================

/// Describes one logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub api_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub plural_label: String,
    #[serde(default)]
    pub sharing_model: SharingModel,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub fields: Vec<FieldMetadata>,
}

impl ObjectMetadata {
    pub fn new(api_name: impl Into<String>) -> Self {
        let api_name = api_name.into();
        Self {
            label: api_name.clone(),
            plural_label: format!("{api_name}s"),
            api_name,
            sharing_model: SharingModel::default(),
            searchable: false,
            fields: Vec::new(),
        }
    }

    pub fn with_labels(mut self, label: impl Into<String>, plural: impl Into<String>) -> Self {
        self.label = label.into();
        self.plural_label = plural.into();
        self
    }

    pub fn with_field(mut self, field: FieldMetadata) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds the owner field. Objects without one have no record owner and
    /// skip ownership checks.
    pub fn owned(self) -> Self {
        self.with_field(
            FieldMetadata::lookup(system::OWNER_ID, Vec::<String>::new())
                .with_label("Owner")
                .system(),
        )
    }

    pub fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    /// Looks up a field by API name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields
            .iter()
            .find(|field| field.api_name.eq_ignore_ascii_case(name))
    }

    pub fn has_owner(&self) -> bool {
        self.field(system::OWNER_ID).is_some()
    }

    /// The field used as a record's display name.
    pub fn name_field(&self) -> Option<&FieldMetadata> {
        self.fields
            .iter()
            .find(|field| field.is_name_field)
            .or_else(|| self.field(system::NAME))
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.iter().filter(|field| field.unique)
    }

    /// Fields that reference `parent` (case-insensitive).
    pub fn fields_referencing<'a>(
        &'a self,
        parent: &'a str,
    ) -> impl Iterator<Item = &'a FieldMetadata> + 'a {
        self.fields.iter().filter(move |field| field.references(parent))
    }

    /// Physical columns, system columns first.
    pub fn storage_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = vec![system::ID.to_string(), system::NAME.to_string()];
        if self.has_owner() {
            columns.push(system::OWNER_ID.to_string());
        }
        columns.extend(
            [
                system::CREATED_BY_ID,
                system::CREATED_DATE,
                system::LAST_MODIFIED_BY_ID,
                system::LAST_MODIFIED_DATE,
                system::IS_DELETED,
            ]
            .map(ToString::to_string),
        );

        for field in &self.fields {
            if field.is_virtual()
                || columns
                    .iter()
                    .any(|column| column.eq_ignore_ascii_case(&field.api_name))
            {
                continue;
            }
            columns.push(field.api_name.clone());
            if field.is_polymorphic() {
                columns.push(system::polymorphic_type_column(&field.api_name));
            }
        }
        columns
    }

    /// Logical type of a physical column, including system columns.
    pub fn column_type(&self, column: &str) -> FieldType {
        if column.eq_ignore_ascii_case(system::IS_DELETED) {
            return FieldType::Boolean;
        }
        if column.eq_ignore_ascii_case(system::CREATED_DATE)
            || column.eq_ignore_ascii_case(system::LAST_MODIFIED_DATE)
        {
            return FieldType::DateTime;
        }
        self.field(column).map_or(FieldType::Text, |field| field.field_type)
    }

    /// Display label for conflict messages.
    pub fn display_plural(&self) -> &str {
        if self.plural_label.is_empty() {
            &self.api_name
        } else {
            &self.plural_label
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Cascade", Some(DeleteRule::Cascade))]
    #[test_case("cascade", Some(DeleteRule::Cascade))]
    #[test_case("CASCADE", Some(DeleteRule::Cascade))]
    #[test_case(" restrict ", Some(DeleteRule::Restrict))]
    #[test_case("SetNull", None)]
    fn test_delete_rule_parse(raw: &str, expected: Option<DeleteRule>) {
        assert_eq!(DeleteRule::parse(raw), expected);
    }

    #[test]
    fn test_missing_delete_rule_restricts() {
        let field = FieldMetadata::lookup("account_id", ["account"]);
        assert_eq!(field.effective_delete_rule(), Some(DeleteRule::Restrict));

        let field = field.with_delete_rule("setnull");
        assert_eq!(field.effective_delete_rule(), None);
    }

    #[test]
    fn test_storage_columns() {
        let task = ObjectMetadata::new("task")
            .owned()
            .with_field(FieldMetadata::new("subject", FieldType::Text).name_field())
            .with_field(FieldMetadata::lookup("what_id", ["account", "contact"]))
            .with_field(FieldMetadata::new("score", FieldType::Formula));

        let columns = task.storage_columns();
        assert_eq!(&columns[..3], &["id", "name", "owner_id"]);
        assert!(columns.contains(&"what_id".to_string()));
        assert!(columns.contains(&"what_id_type".to_string()));
        assert!(!columns.contains(&"score".to_string()));
        assert_eq!(
            columns.iter().filter(|c| c.as_str() == "owner_id").count(),
            1
        );
    }

    #[test]
    fn test_read_only_fields() {
        assert!(FieldMetadata::new("id", FieldType::Text).is_read_only());
        assert!(FieldMetadata::new("case_number", FieldType::AutoNumber).is_read_only());
        assert!(FieldMetadata::new("total", FieldType::RollupSummary).is_read_only());
        assert!(!FieldMetadata::new("industry", FieldType::Picklist).is_read_only());
    }

    #[test]
    fn test_field_type_serde_names() {
        let json = serde_json::to_string(&FieldType::Json).unwrap();
        assert_eq!(json, "\"JSON\"");
        let parsed: FieldType = serde_json::from_str("\"DateTime\"").unwrap();
        assert_eq!(parsed, FieldType::DateTime);
    }

    #[test]
    fn test_field_lookup_is_case_insensitive() {
        let account = ObjectMetadata::new("account")
            .with_field(FieldMetadata::new("Industry", FieldType::Picklist));
        assert!(account.field("industry").is_some());
        assert_eq!(account.column_type("is_deleted"), FieldType::Boolean);
        assert_eq!(account.column_type("industry"), FieldType::Picklist);
    }
}
