//! Catalog sources.
//!
//! A [`Catalog`] is everything the engine needs to know about the schema at
//! one point in time. Sources produce catalogs; the cache snapshots them.

use crate::error::{MetadataError, Result};
use crate::object::ObjectMetadata;
use crate::rules::{AutoNumberSequence, SharingRule, ValidationRule};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Complete schema description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub objects: Vec<ObjectMetadata>,
    pub validation_rules: Vec<ValidationRule>,
    pub auto_numbers: Vec<AutoNumberSequence>,
    pub sharing_rules: Vec<SharingRule>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, object: ObjectMetadata) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_validation_rule(mut self, rule: ValidationRule) -> Self {
        self.validation_rules.push(rule);
        self
    }

    pub fn with_auto_number(mut self, sequence: AutoNumberSequence) -> Self {
        self.auto_numbers.push(sequence);
        self
    }

    pub fn with_sharing_rule(mut self, rule: SharingRule) -> Self {
        self.sharing_rules.push(rule);
        self
    }

    /// Object and field names become SQL identifiers, so they are checked
    /// here once.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for object in &self.objects {
            check_identifier(&object.api_name)?;
            if !seen.insert(object.api_name.to_ascii_lowercase()) {
                return Err(MetadataError::InvalidCatalog(format!(
                    "duplicate object '{}'",
                    object.api_name
                )));
            }
            let mut fields = HashSet::new();
            for field in &object.fields {
                check_identifier(&field.api_name)?;
                if !fields.insert(field.api_name.to_ascii_lowercase()) {
                    return Err(MetadataError::InvalidCatalog(format!(
                        "duplicate field '{}' on '{}'",
                        field.api_name, object.api_name
                    )));
                }
            }
        }
        for sequence in &self.auto_numbers {
            check_identifier(&sequence.object_api_name)?;
            check_identifier(&sequence.field_api_name)?;
        }
        Ok(())
    }
}

/// Returns an error unless `name` is a plain identifier.
pub(crate) fn check_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MetadataError::InvalidCatalog(format!(
            "'{name}' is not a valid identifier"
        )))
    }
}

/// Supplies catalogs to the cache.
pub trait MetadataSource: Send + Sync {
    fn load(&self) -> Result<Catalog>;
}

/// In-memory catalog. `replace` stands in for schema management; callers
/// invalidate the cache afterwards.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    catalog: RwLock<Catalog>,
}

impl StaticCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
        }
    }

    pub fn replace(&self, catalog: Catalog) -> Result<()> {
        let mut guard = self
            .catalog
            .write()
            .map_err(|_| MetadataError::LockPoisoned)?;
        *guard = catalog;
        Ok(())
    }
}

impl MetadataSource for StaticCatalog {
    fn load(&self) -> Result<Catalog> {
        let guard = self
            .catalog
            .read()
            .map_err(|_| MetadataError::LockPoisoned)?;
        Ok(guard.clone())
    }
}

/// Catalog read from a `.json` or `.toml` file on every load.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetadataSource for FileCatalog {
    fn load(&self) -> Result<Catalog> {
        let text = std::fs::read_to_string(&self.path).map_err(|source| MetadataError::Read {
            path: self.path.clone(),
            source,
        })?;

        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let catalog: Catalog = match extension.as_deref() {
            Some("json") => {
                serde_json::from_str(&text).map_err(|source| MetadataError::ParseJson {
                    path: self.path.clone(),
                    source,
                })?
            }
            Some("toml") => toml::from_str(&text).map_err(|source| MetadataError::ParseToml {
                path: self.path.clone(),
                source,
            })?,
            _ => return Err(MetadataError::UnsupportedFormat(self.path.clone())),
        };

        debug!(
            path = %self.path.display(),
            objects = catalog.objects.len(),
            "Loaded catalog file"
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{FieldMetadata, FieldType};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_validate_rejects_bad_identifiers() {
        let catalog = Catalog::new().with_object(ObjectMetadata::new("bad name"));
        assert!(catalog.validate().is_err());

        let catalog = Catalog::new().with_object(
            ObjectMetadata::new("account")
                .with_field(FieldMetadata::new("x\"; DROP", FieldType::Text)),
        );
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let catalog = Catalog::new()
            .with_object(ObjectMetadata::new("Account"))
            .with_object(ObjectMetadata::new("account"));
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_file_catalog_json() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("catalog.json");
        fs::write(
            &path,
            r#"{
                "objects": [{
                    "api_name": "account",
                    "plural_label": "Accounts",
                    "fields": [
                        {"api_name": "name", "type": "Text", "required": true, "is_name_field": true},
                        {"api_name": "parent_id", "type": "Lookup", "reference_to": ["account"], "delete_rule": "cascade"}
                    ]
                }],
                "auto_numbers": [{"object_api_name": "account", "field_api_name": "number", "display_format": "A-{000}"}]
            }"#,
        )
        .expect("Failed to write catalog");

        let catalog = FileCatalog::new(&path).load().expect("Failed to load catalog");
        assert_eq!(catalog.objects.len(), 1);
        let account = &catalog.objects[0];
        assert!(account.field("name").is_some_and(|f| f.required));
        assert_eq!(catalog.auto_numbers[0].starting_number, 1);
        assert!(catalog.validate().is_ok());
    }

    #[test]
    fn test_file_catalog_toml() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("catalog.toml");
        fs::write(
            &path,
            r#"
[[objects]]
api_name = "contact"

[[objects.fields]]
api_name = "email"
type = "Email"
unique = true

[[validation_rules]]
object_api_name = "contact"
name = "email_required"
condition = "ISBLANK(email)"
error_message = "Email is required"
"#,
        )
        .expect("Failed to write catalog");

        let catalog = FileCatalog::new(&path).load().expect("Failed to load catalog");
        assert_eq!(catalog.objects[0].fields[0].field_type, FieldType::Email);
        assert!(catalog.validation_rules[0].active);
    }

    #[test]
    fn test_file_catalog_unknown_extension() {
        let dir = tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("catalog.yaml");
        fs::write(&path, "objects: []").expect("Failed to write catalog");
        assert!(matches!(
            FileCatalog::new(&path).load(),
            Err(MetadataError::UnsupportedFormat(_))
        ));
    }
}
