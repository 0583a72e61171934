//! Permission directory: where grants, roles, groups and shares live.

use crate::grants::{FieldGrant, ObjectGrant, ObjectPattern, RecordShare};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tessera_types::UserSession;

/// Source of permission data for the access controller.
///
/// Administration of these grants is somebody else's job; the controller
/// only reads them.
pub trait AccessDirectory: Send + Sync {
    /// Effective object grant for a user (profile merged with permission
    /// sets), or `None` if nothing grants anything.
    fn object_grant(&self, user: &UserSession, object: &str) -> Option<ObjectGrant>;

    /// Explicit field grant, or `None` to fall back to the object grant.
    fn field_grant(&self, user: &UserSession, object: &str, field: &str) -> Option<FieldGrant>;

    /// Child role to parent role.
    fn role_parents(&self) -> HashMap<String, String>;

    fn is_group_member(&self, group_id: &str, user_id: &str) -> bool;

    /// Explicit shares of one record.
    fn record_shares(&self, object: &str, record_id: &str) -> Vec<RecordShare>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    /// Grant holder (profile or permission set) to object grants.
    object_grants: HashMap<String, Vec<(ObjectPattern, ObjectGrant)>>,
    /// Grant holder to (object, field) grants, keys lower-cased.
    field_grants: HashMap<String, HashMap<(String, String), FieldGrant>>,
    /// User to assigned permission sets.
    permission_sets: HashMap<String, Vec<String>>,
    role_parents: HashMap<String, String>,
    group_members: HashMap<String, HashSet<String>>,
    /// (object lower-cased, record id) to shares.
    record_shares: HashMap<(String, String), Vec<RecordShare>>,
}

impl DirectoryState {
    fn holders<'a>(&'a self, user: &'a UserSession) -> impl Iterator<Item = &'a str> + 'a {
        std::iter::once(user.profile_id.as_str()).chain(
            self.permission_sets
                .get(&user.id)
                .into_iter()
                .flatten()
                .map(String::as_str),
        )
    }
}

/// In-memory [`AccessDirectory`].
///
/// Builder methods set up a directory before it is shared; the `&self`
/// methods change it at runtime.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DirectoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------------

    /// Grants `grant` on objects matching `pattern` to a profile or
    /// permission set.
    pub fn with_object_grant(self, holder: &str, pattern: &str, grant: ObjectGrant) -> Self {
        self.grant_object(holder, pattern, grant);
        self
    }

    pub fn with_field_grant(self, holder: &str, object: &str, field: &str, grant: FieldGrant) -> Self {
        self.grant_field(holder, object, field, grant);
        self
    }

    pub fn with_permission_set(self, user_id: &str, permission_set: &str) -> Self {
        self.assign_permission_set(user_id, permission_set);
        self
    }

    pub fn with_role(self, role_id: &str, parent: Option<&str>) -> Self {
        self.set_role_parent(role_id, parent);
        self
    }

    pub fn with_group_member(self, group_id: &str, user_id: &str) -> Self {
        self.add_group_member(group_id, user_id);
        self
    }

    pub fn with_record_share(self, object: &str, record_id: &str, share: RecordShare) -> Self {
        self.share_record(object, record_id, share);
        self
    }

    // ------------------------------------------------------------------------
    // Runtime changes
    // ------------------------------------------------------------------------

    pub fn grant_object(&self, holder: &str, pattern: &str, grant: ObjectGrant) {
        self.write()
            .object_grants
            .entry(holder.to_string())
            .or_default()
            .push((ObjectPattern::new(pattern), grant));
    }

    pub fn grant_field(&self, holder: &str, object: &str, field: &str, grant: FieldGrant) {
        self.write()
            .field_grants
            .entry(holder.to_string())
            .or_default()
            .insert(
                (object.to_ascii_lowercase(), field.to_ascii_lowercase()),
                grant,
            );
    }

    pub fn assign_permission_set(&self, user_id: &str, permission_set: &str) {
        self.write()
            .permission_sets
            .entry(user_id.to_string())
            .or_default()
            .push(permission_set.to_string());
    }

    pub fn set_role_parent(&self, role_id: &str, parent: Option<&str>) {
        let mut state = self.write();
        match parent {
            Some(parent) => {
                state
                    .role_parents
                    .insert(role_id.to_string(), parent.to_string());
            }
            None => {
                state.role_parents.remove(role_id);
            }
        }
    }

    pub fn add_group_member(&self, group_id: &str, user_id: &str) {
        self.write()
            .group_members
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    pub fn share_record(&self, object: &str, record_id: &str, share: RecordShare) {
        self.write()
            .record_shares
            .entry((object.to_ascii_lowercase(), record_id.to_string()))
            .or_default()
            .push(share);
    }

    pub fn revoke_record_shares(&self, object: &str, record_id: &str) {
        self.write()
            .record_shares
            .remove(&(object.to_ascii_lowercase(), record_id.to_string()));
    }
}

impl AccessDirectory for InMemoryDirectory {
    fn object_grant(&self, user: &UserSession, object: &str) -> Option<ObjectGrant> {
        let state = self.read();
        state
            .holders(user)
            .filter_map(|holder| state.object_grants.get(holder))
            .flatten()
            .filter(|(pattern, _)| pattern.matches(object))
            .map(|(_, grant)| *grant)
            .reduce(ObjectGrant::merge)
    }

    fn field_grant(&self, user: &UserSession, object: &str, field: &str) -> Option<FieldGrant> {
        let state = self.read();
        let key = (object.to_ascii_lowercase(), field.to_ascii_lowercase());
        state
            .holders(user)
            .filter_map(|holder| state.field_grants.get(holder))
            .filter_map(|grants| grants.get(&key).copied())
            .reduce(FieldGrant::merge)
    }

    fn role_parents(&self) -> HashMap<String, String> {
        self.read().role_parents.clone()
    }

    fn is_group_member(&self, group_id: &str, user_id: &str) -> bool {
        self.read()
            .group_members
            .get(group_id)
            .is_some_and(|members| members.contains(user_id))
    }

    fn record_shares(&self, object: &str, record_id: &str) -> Vec<RecordShare> {
        self.read()
            .record_shares
            .get(&(object.to_ascii_lowercase(), record_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::Operation;

    #[test]
    fn test_permission_sets_extend_profile() {
        let directory = InMemoryDirectory::new()
            .with_object_grant("standard", "account", ObjectGrant::read_only())
            .with_object_grant("deleters", "account", ObjectGrant {
                allow_delete: true,
                ..ObjectGrant::none()
            })
            .with_permission_set("u2", "deleters");

        let u1 = UserSession::new("u1", "One", "standard");
        let u2 = UserSession::new("u2", "Two", "standard");

        let g1 = directory.object_grant(&u1, "account").unwrap();
        assert!(!g1.allows(Operation::Delete));
        let g2 = directory.object_grant(&u2, "account").unwrap();
        assert!(g2.allows(Operation::Delete));
        assert!(g2.allows(Operation::Read));
    }

    #[test]
    fn test_wildcard_grants() {
        let directory =
            InMemoryDirectory::new().with_object_grant("auditor", "*", ObjectGrant::read_only());
        let user = UserSession::new("a", "Audit", "auditor");
        assert!(directory.object_grant(&user, "anything").is_some());
        let other = UserSession::new("b", "Other", "standard");
        assert!(directory.object_grant(&other, "anything").is_none());
    }

    #[test]
    fn test_field_grants_case_insensitive() {
        let directory = InMemoryDirectory::new().with_field_grant(
            "standard",
            "Account",
            "Secret",
            FieldGrant::hidden(),
        );
        let user = UserSession::new("u1", "One", "standard");
        assert_eq!(
            directory.field_grant(&user, "account", "secret"),
            Some(FieldGrant::hidden())
        );
        assert_eq!(directory.field_grant(&user, "account", "name"), None);
    }

    #[test]
    fn test_groups_and_shares() {
        let directory = InMemoryDirectory::new().with_group_member("support", "u1");
        assert!(directory.is_group_member("support", "u1"));
        assert!(!directory.is_group_member("support", "u2"));

        directory.share_record(
            "Case",
            "c1",
            RecordShare::new(
                tessera_metadata::ShareTarget::User("u2".into()),
                tessera_metadata::AccessLevel::Read,
            ),
        );
        assert_eq!(directory.record_shares("case", "c1").len(), 1);
        directory.revoke_record_shares("case", "c1");
        assert!(directory.record_shares("case", "c1").is_empty());
    }
}
