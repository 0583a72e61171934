//! Actor identity and per-request state.

use crate::{CancelToken, Cancelled};
use serde::{Deserialize, Serialize};

/// The authenticated actor behind a request.
///
/// Session issuance happens elsewhere; this is only the resolved identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Profile that determines baseline permissions.
    pub profile_id: String,
    /// Position in the role hierarchy, if any.
    #[serde(default)]
    pub role_id: Option<String>,
}

impl UserSession {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        profile_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            profile_id: profile_id.into(),
            role_id: None,
        }
    }

    pub fn with_role(mut self, role_id: impl Into<String>) -> Self {
        self.role_id = Some(role_id.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// State threaded through every engine call: who is acting, and whether
/// the caller has given up on the request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    actor: Option<UserSession>,
    cancel: CancelToken,
}

impl RequestContext {
    pub fn new(actor: UserSession) -> Self {
        Self {
            actor: Some(actor),
            cancel: CancelToken::new(),
        }
    }

    /// A context with no actor. Every permission check denies it.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn actor(&self) -> Option<&UserSession> {
        self.actor.as_ref()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        self.cancel.check()
    }
}
