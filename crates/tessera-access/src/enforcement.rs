//! Access enforcement.
//!
//! Object, field and schema checks live here; record-level checks are in
//! `record_access`.

use crate::directory::AccessDirectory;
use crate::error::{AccessError, Result};
use crate::hierarchy::RoleHierarchy;
use std::sync::{Arc, PoisonError, RwLock};
use tessera_expr::{Evaluator, ExpressionEvaluator};
use tessera_metadata::{MetadataCache, ObjectMetadata};
use tessera_types::{Operation, UserSession, system};
use tracing::{debug, warn};

/// Profile id that bypasses access checks unless configured otherwise.
pub const DEFAULT_SUPER_USER_PROFILE: &str = "system_admin";

/// Access control engine shared by the mutation engine and the RLS rewriter.
pub struct AccessController {
    pub(crate) metadata: Arc<MetadataCache>,
    pub(crate) directory: Arc<dyn AccessDirectory>,
    pub(crate) evaluator: Arc<dyn Evaluator>,
    super_user_profile: String,
    hierarchy: RwLock<Option<Arc<RoleHierarchy>>>,
    pub(crate) audit_enabled: bool,
}

impl AccessController {
    pub fn new(metadata: Arc<MetadataCache>, directory: Arc<dyn AccessDirectory>) -> Self {
        Self {
            metadata,
            directory,
            evaluator: Arc::new(ExpressionEvaluator::new()),
            super_user_profile: DEFAULT_SUPER_USER_PROFILE.to_string(),
            hierarchy: RwLock::new(None),
            audit_enabled: true,
        }
    }

    /// Replaces the evaluator used for sharing-rule criteria.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_super_user_profile(mut self, profile: impl Into<String>) -> Self {
        self.super_user_profile = profile.into();
        self
    }

    /// Disables audit logging (for testing).
    pub fn without_audit(mut self) -> Self {
        self.audit_enabled = false;
        self
    }

    pub fn metadata(&self) -> &Arc<MetadataCache> {
        &self.metadata
    }

    pub fn is_super_user(&self, actor: Option<&UserSession>) -> bool {
        actor.is_some_and(|user| user.profile_id == self.super_user_profile)
    }

    /// Cached role hierarchy, built from the directory on first use.
    pub(crate) fn hierarchy(&self) -> Arc<RoleHierarchy> {
        if let Some(hierarchy) = self
            .hierarchy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Arc::clone(hierarchy);
        }
        let mut guard = self
            .hierarchy
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            guard.get_or_insert_with(|| Arc::new(RoleHierarchy::new(self.directory.role_parents()))),
        )
    }

    /// Drops the cached role hierarchy after roles change.
    pub fn invalidate_roles(&self) {
        *self
            .hierarchy
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    // ========================================================================
    // Object level
    // ========================================================================

    /// Returns true if the actor's profile grants `operation` on `object`.
    pub fn can_access_object(
        &self,
        actor: Option<&UserSession>,
        object: &str,
        operation: Operation,
    ) -> bool {
        let Some(user) = actor else {
            return false;
        };
        if self.is_super_user(actor) {
            return true;
        }
        self.directory
            .object_grant(user, object)
            .is_some_and(|grant| grant.allows(operation))
    }

    /// Enforces object-level access.
    ///
    /// **Audit:** Logs every decision when audit is enabled.
    pub fn check_object(
        &self,
        actor: Option<&UserSession>,
        object: &str,
        operation: Operation,
    ) -> Result<()> {
        let allowed = self.can_access_object(actor, object, operation);

        if self.audit_enabled {
            let user = actor.map_or("<none>", |u| u.id.as_str());
            if allowed {
                debug!(object = %object, user = %user, operation = %operation, "Object access granted");
            } else {
                warn!(object = %object, user = %user, operation = %operation, "Object access denied");
            }
        }

        if allowed {
            Ok(())
        } else {
            Err(AccessError::ObjectDenied {
                operation,
                object: object.to_string(),
            })
        }
    }

    // ========================================================================
    // Field level
    // ========================================================================

    /// Field visibility. An explicit field grant wins; otherwise the
    /// object-level read grant decides.
    pub fn can_view_field(
        &self,
        actor: Option<&UserSession>,
        schema: &ObjectMetadata,
        field: &str,
    ) -> bool {
        let Some(user) = actor else {
            return false;
        };
        if self.is_super_user(actor) {
            return true;
        }
        match self.directory.field_grant(user, &schema.api_name, field) {
            Some(grant) => grant.readable,
            None => self.can_access_object(actor, &schema.api_name, Operation::Read),
        }
    }

    /// Field editability. System fields are never editable, not even by a
    /// super-user.
    pub fn can_edit_field(
        &self,
        actor: Option<&UserSession>,
        schema: &ObjectMetadata,
        field: &str,
    ) -> bool {
        if system::is_generated_field(field) || schema.field(field).is_some_and(|f| f.is_system) {
            return false;
        }
        let Some(user) = actor else {
            return false;
        };
        if self.is_super_user(actor) {
            return true;
        }
        match self.directory.field_grant(user, &schema.api_name, field) {
            Some(grant) => grant.editable,
            None => self.can_access_object(actor, &schema.api_name, Operation::Edit),
        }
    }

    /// Enforces field visibility.
    pub fn check_field_visible(
        &self,
        actor: Option<&UserSession>,
        schema: &ObjectMetadata,
        field: &str,
    ) -> Result<()> {
        if self.can_view_field(actor, schema, field) {
            return Ok(());
        }
        if self.audit_enabled {
            warn!(object = %schema.api_name, field = %field, "Field access denied");
        }
        Err(AccessError::FieldDenied {
            operation: Operation::Read,
            object: schema.api_name.clone(),
            field: field.to_string(),
        })
    }

    // ========================================================================
    // Effective schema
    // ========================================================================

    /// The schema restricted to fields the actor can see.
    ///
    /// A missing schema stays missing; a nil actor sees no fields at all.
    pub fn effective_schema(
        &self,
        schema: Option<&ObjectMetadata>,
        actor: Option<&UserSession>,
    ) -> Option<ObjectMetadata> {
        let schema = schema?;
        if self.is_super_user(actor) {
            return Some(schema.clone());
        }

        let mut effective = schema.clone();
        effective
            .fields
            .retain(|field| self.can_view_field(actor, schema, &field.api_name));

        if self.audit_enabled && effective.fields.len() < schema.fields.len() {
            debug!(
                object = %schema.api_name,
                visible = effective.fields.len(),
                total = schema.fields.len(),
                "Fields filtered from schema"
            );
        }
        Some(effective)
    }

    /// Loads the schema from the cache and filters it.
    pub fn effective_schema_for(
        &self,
        object: &str,
        actor: Option<&UserSession>,
    ) -> Result<Option<ObjectMetadata>> {
        let schema = self.metadata.get_schema(object)?;
        Ok(self.effective_schema(schema.as_deref(), actor))
    }
}

impl std::fmt::Debug for AccessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessController")
            .field("super_user_profile", &self.super_user_profile)
            .field("audit_enabled", &self.audit_enabled)
            .finish_non_exhaustive()
    }
}
