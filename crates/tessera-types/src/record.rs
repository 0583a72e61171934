//! Generic field-name-to-value records.

use crate::{Value, system};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A generic record instance: field API name to [`Value`].
///
/// Key order carries no meaning. Lookups try the exact key first and fall
/// back to a case-insensitive match, since callers do not always use the
/// schema's spelling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).or_else(|| {
            self.0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(field))
                .map(|(_, value)| value)
        })
    }

    /// Returns the value as a string slice, treating non-strings as absent.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Removes a field by case-insensitive name.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        if let Some(value) = self.0.remove(field) {
            return Some(value);
        }
        let key = self
            .0
            .keys()
            .find(|key| key.eq_ignore_ascii_case(field))
            .cloned()?;
        self.0.remove(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The record id, if present and non-blank.
    pub fn id(&self) -> Option<&str> {
        self.get_str(system::ID).filter(|id| !id.is_empty())
    }

    /// The owner id. An explicit null owner and a missing owner both
    /// resolve to `None`.
    pub fn owner_id(&self) -> Option<&str> {
        self.get_str(system::OWNER_ID).filter(|id| !id.is_empty())
    }

    /// True if the record carries an owner column at all, even a null one.
    pub fn has_owner_field(&self) -> bool {
        self.contains(system::OWNER_ID)
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }

    /// Converts to a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Value>> for Record {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}
