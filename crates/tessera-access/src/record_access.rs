//! Record-level access.
//!
//! Checked in priority order, first match wins:
//!
//! 1. super-user, or "view all" / "modify all" on the object
//! 2. owner
//! 3. record shared with a role at or above the actor's role
//! 4. record shared with (or owned by) a group the actor belongs to
//! 5. a sharing rule whose identity and criteria match
//! 6. deny
//!
//! Records without an owner column skip steps 2 to 4.

use crate::enforcement::AccessController;
use crate::error::{AccessError, Result};
use crate::hierarchy::RoleHierarchy;
use tessera_expr::EvalContext;
use tessera_metadata::{ObjectMetadata, ShareTarget, SharingRule};
use tessera_types::{Operation, Record, UserSession};
use tracing::{debug, warn};

/// Which step granted access. Used for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    SuperUser,
    ObjectWide,
    Owner,
    RoleShare,
    GroupShare,
    SharingRule,
}

impl AccessController {
    /// Returns true if the actor may perform `operation` on `record`.
    pub fn can_access_record(
        &self,
        actor: Option<&UserSession>,
        schema: &ObjectMetadata,
        record: &Record,
        operation: Operation,
    ) -> Result<bool> {
        Ok(self.record_grant(actor, schema, record, operation)?.is_some())
    }

    /// Enforces record-level access.
    ///
    /// **Audit:** Logs the granting step, or the denial.
    pub fn check_record(
        &self,
        actor: Option<&UserSession>,
        schema: &ObjectMetadata,
        record: &Record,
        operation: Operation,
    ) -> Result<()> {
        let grant = self.record_grant(actor, schema, record, operation)?;
        let record_id = record.id().unwrap_or_default();

        if self.audit_enabled {
            let user = actor.map_or("<none>", |u| u.id.as_str());
            match grant {
                Some(grant) => debug!(
                    object = %schema.api_name,
                    record_id = %record_id,
                    user = %user,
                    operation = %operation,
                    grant = ?grant,
                    "Record access granted"
                ),
                None => warn!(
                    object = %schema.api_name,
                    record_id = %record_id,
                    user = %user,
                    operation = %operation,
                    "Record access denied"
                ),
            }
        }

        match grant {
            Some(_) => Ok(()),
            None => Err(AccessError::RecordDenied {
                operation,
                object: schema.api_name.clone(),
                record_id: record_id.to_string(),
            }),
        }
    }

    fn record_grant(
        &self,
        actor: Option<&UserSession>,
        schema: &ObjectMetadata,
        record: &Record,
        operation: Operation,
    ) -> Result<Option<Grant>> {
        let Some(user) = actor else {
            return Ok(None);
        };
        if self.is_super_user(actor) {
            return Ok(Some(Grant::SuperUser));
        }
        if self.object_wide_grant(user, schema, operation) {
            return Ok(Some(Grant::ObjectWide));
        }

        let hierarchy = self.hierarchy();

        if record.has_owner_field() {
            if let Some(grant) = self.ownership_grant(user, schema, record, operation, &hierarchy)
            {
                return Ok(Some(grant));
            }
        }

        let rules = self.metadata.get_sharing_rules(&schema.api_name)?;
        let by_rule = rules
            .iter()
            .any(|rule| self.rule_grants(rule, user, record, operation, &hierarchy));
        Ok(by_rule.then_some(Grant::SharingRule))
    }

    /// "View all" or "modify all" on the object covers every record.
    fn object_wide_grant(&self, user: &UserSession, schema: &ObjectMetadata, operation: Operation) -> bool {
        self.directory
            .object_grant(user, &schema.api_name)
            .is_some_and(|grant| match operation {
                Operation::Read => grant.view_all || grant.modify_all,
                Operation::Edit | Operation::Delete => grant.modify_all,
                Operation::Create => false,
            })
    }

    /// Steps 2 to 4.
    fn ownership_grant(
        &self,
        user: &UserSession,
        schema: &ObjectMetadata,
        record: &Record,
        operation: Operation,
        hierarchy: &RoleHierarchy,
    ) -> Option<Grant> {
        let owner = record.owner_id();
        if owner == Some(user.id.as_str()) {
            return Some(Grant::Owner);
        }

        let shares = record
            .id()
            .map(|id| self.directory.record_shares(&schema.api_name, id))
            .unwrap_or_default();

        let role_share = shares.iter().any(|share| {
            share.access_level.permits(operation)
                && match &share.share_with {
                    ShareTarget::Role(role) => user
                        .role_id
                        .as_deref()
                        .is_some_and(|actor_role| hierarchy.is_in_role_or_below(actor_role, role)),
                    ShareTarget::User(id) => *id == user.id,
                    ShareTarget::Group(_) => false,
                }
        });
        if role_share {
            return Some(Grant::RoleShare);
        }

        // A record owned by a group (queue) is accessible to its members.
        if owner.is_some_and(|owner| self.directory.is_group_member(owner, &user.id)) {
            return Some(Grant::GroupShare);
        }
        let group_share = shares.iter().any(|share| {
            share.access_level.permits(operation)
                && matches!(&share.share_with, ShareTarget::Group(group)
                    if self.directory.is_group_member(group, &user.id))
        });
        group_share.then_some(Grant::GroupShare)
    }

    /// Step 5: does `rule` grant `operation` on `record` to `user`?
    fn rule_grants(
        &self,
        rule: &SharingRule,
        user: &UserSession,
        record: &Record,
        operation: Operation,
        hierarchy: &RoleHierarchy,
    ) -> bool {
        if !rule.access_level.permits(operation) {
            return false;
        }

        let identity_matches = match &rule.share_with {
            ShareTarget::Role(role) => user
                .role_id
                .as_deref()
                .is_some_and(|actor_role| hierarchy.is_in_role_or_below(actor_role, role)),
            ShareTarget::Group(group) => self.directory.is_group_member(group, &user.id),
            ShareTarget::User(id) => *id == user.id,
        };
        if !identity_matches {
            return false;
        }

        if rule.matches_all() {
            return true;
        }
        let Some(criteria) = rule.criteria.as_deref() else {
            return true;
        };

        let ctx = EvalContext::new(record, Some(user));
        match self.evaluator.evaluate_bool(criteria, &ctx) {
            Ok(matched) => matched,
            Err(err) => {
                debug!(
                    rule = %rule.id,
                    object = %rule.object_api_name,
                    error = %err,
                    "Sharing rule criteria did not evaluate, treating as no match"
                );
                false
            }
        }
    }
}
