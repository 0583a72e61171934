//! Process-scoped metadata cache.
//!
//! Readers share an immutable snapshot behind a read lock. Invalidation
//! drops the snapshot under the write lock; the next reader rebuilds it.
//! Requests that already hold an `Arc` keep their snapshot until they
//! finish, so a schema change is visible to subsequent readers only.

use crate::catalog::{Catalog, MetadataSource};
use crate::error::{MetadataError, Result};
use crate::object::ObjectMetadata;
use crate::rules::{AutoNumberSequence, SharingRule, ValidationRule};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Indexed view of one catalog. Keys are lower-cased object names.
#[derive(Debug, Default)]
struct Snapshot {
    objects: HashMap<String, Arc<ObjectMetadata>>,
    ordered: Vec<Arc<ObjectMetadata>>,
    children: HashMap<String, Vec<Arc<ObjectMetadata>>>,
    validation_rules: HashMap<String, Vec<ValidationRule>>,
    auto_numbers: HashMap<String, Vec<AutoNumberSequence>>,
    sharing_rules: HashMap<String, Vec<SharingRule>>,
}

impl Snapshot {
    fn build(catalog: Catalog) -> Self {
        let mut snapshot = Snapshot::default();

        for object in catalog.objects {
            let object = Arc::new(object);
            snapshot
                .objects
                .insert(object.api_name.to_ascii_lowercase(), Arc::clone(&object));
            snapshot.ordered.push(object);
        }

        for object in &snapshot.ordered {
            let mut targets: Vec<String> = object
                .fields
                .iter()
                .flat_map(|field| field.reference_to.iter())
                .map(|target| target.to_ascii_lowercase())
                .collect();
            targets.sort();
            targets.dedup();
            for target in targets {
                snapshot
                    .children
                    .entry(target)
                    .or_default()
                    .push(Arc::clone(object));
            }
        }

        for rule in catalog.validation_rules {
            snapshot
                .validation_rules
                .entry(rule.object_api_name.to_ascii_lowercase())
                .or_default()
                .push(rule);
        }
        for sequence in catalog.auto_numbers {
            snapshot
                .auto_numbers
                .entry(sequence.object_api_name.to_ascii_lowercase())
                .or_default()
                .push(sequence);
        }
        for rule in catalog.sharing_rules {
            snapshot
                .sharing_rules
                .entry(rule.object_api_name.to_ascii_lowercase())
                .or_default()
                .push(rule);
        }

        snapshot
    }
}

/// Shared, read-mostly metadata cache.
pub struct MetadataCache {
    source: Arc<dyn MetadataSource>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
}

impl MetadataCache {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
        }
    }

    /// Loads the catalog now instead of on first use.
    pub fn init(&self) -> Result<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| MetadataError::LockPoisoned)?;
        let snapshot = self.load()?;
        *guard = Some(snapshot);
        Ok(())
    }

    /// Drops the current snapshot.
    pub fn invalidate(&self) -> Result<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| MetadataError::LockPoisoned)?;
        if guard.take().is_some() {
            info!("Metadata cache invalidated");
        }
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().is_ok_and(|guard| guard.is_some())
    }

    fn load(&self) -> Result<Arc<Snapshot>> {
        let catalog = self.source.load()?;
        catalog.validate()?;
        let snapshot = Snapshot::build(catalog);
        info!(objects = snapshot.ordered.len(), "Metadata cache loaded");
        Ok(Arc::new(snapshot))
    }

    fn snapshot(&self) -> Result<Arc<Snapshot>> {
        {
            let guard = self
                .snapshot
                .read()
                .map_err(|_| MetadataError::LockPoisoned)?;
            if let Some(snapshot) = guard.as_ref() {
                return Ok(Arc::clone(snapshot));
            }
        }

        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| MetadataError::LockPoisoned)?;
        // Another reader may have rebuilt it while we waited.
        if let Some(snapshot) = guard.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        debug!("Metadata cache empty, rebuilding");
        let snapshot = self.load()?;
        *guard = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// `ObjectMetadata` for an object, or `None` if it does not exist.
    pub fn get_schema(&self, object: &str) -> Result<Option<Arc<ObjectMetadata>>> {
        Ok(self
            .snapshot()?
            .objects
            .get(&object.to_ascii_lowercase())
            .cloned())
    }

    /// Objects with at least one field referencing `parent`.
    pub fn get_child_relationships(&self, parent: &str) -> Result<Vec<Arc<ObjectMetadata>>> {
        Ok(self
            .snapshot()?
            .children
            .get(&parent.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    pub fn get_validation_rules(&self, object: &str) -> Result<Vec<ValidationRule>> {
        Ok(self
            .snapshot()?
            .validation_rules
            .get(&object.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    pub fn get_auto_numbers(&self, object: &str) -> Result<Vec<AutoNumberSequence>> {
        Ok(self
            .snapshot()?
            .auto_numbers
            .get(&object.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    pub fn get_sharing_rules(&self, object: &str) -> Result<Vec<SharingRule>> {
        Ok(self
            .snapshot()?
            .sharing_rules
            .get(&object.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    /// All objects in catalog order.
    pub fn all_schemas(&self) -> Result<Vec<Arc<ObjectMetadata>>> {
        Ok(self.snapshot()?.ordered.clone())
    }
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}
