//! Role hierarchy.

use std::collections::{HashMap, HashSet};

/// Child-to-parent role map.
///
/// Sharing with a role propagates downward to every subordinate role,
/// never upward.
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    parents: HashMap<String, String>,
}

impl RoleHierarchy {
    pub fn new(parents: HashMap<String, String>) -> Self {
        Self { parents }
    }

    /// Strict ancestors of `role`, nearest first. A cycle in the map ends
    /// the walk instead of looping.
    pub fn ancestors(&self, role: &str) -> Vec<String> {
        let mut ancestors = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([role]);
        let mut current = role;

        while let Some(parent) = self.parents.get(current) {
            if !visited.insert(parent.as_str()) {
                break;
            }
            ancestors.push(parent.clone());
            current = parent.as_str();
        }

        ancestors
    }

    /// True if `actor_role` is `target_role` or a descendant of it.
    pub fn is_in_role_or_below(&self, actor_role: &str, target_role: &str) -> bool {
        actor_role == target_role
            || self
                .ancestors(actor_role)
                .iter()
                .any(|ancestor| ancestor == target_role)
    }
}
