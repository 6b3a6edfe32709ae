//! Authenticated identity and permission decisions.
//!
//! An [`AuthUser`] is a transient snapshot of a user's roles and derived
//! permissions, resolved from storage (cache-first) per request and never
//! persisted as its own record. A [`PermissionDecision`] is the outcome of
//! one permission check and is cacheable independently.

mod authenticator;
mod extract;

pub use authenticator::Authenticator;
pub use extract::{auth_context, AuthContext, CurrentUser, MaybeUser};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::user::DbUser;
use crate::rbac::{PermissionCode, RoleCode, RoleRegistry};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub roles: HashSet<RoleCode>,
    pub permissions: HashSet<PermissionCode>,
    pub is_active: bool,
    pub is_admin: bool,
    pub is_superuser: bool,
}

impl AuthUser {
    pub fn resolve(user: &DbUser, roles: HashSet<RoleCode>, registry: &RoleRegistry) -> Self {
        let permissions = registry.permissions_for_roles(roles.iter());
        let is_superuser = roles.contains(crate::rbac::SUPER_ADMIN);
        let is_admin = is_superuser || roles.contains(crate::rbac::ADMIN);
        Self {
            id: user.id,
            email: Some(user.email.clone()),
            roles,
            permissions,
            is_active: user.is_active,
            is_admin,
            is_superuser,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_permission(&self, permission: &PermissionCode) -> bool {
        self.permissions.contains(permission)
    }
}

/// Declared requirement a route attaches to a permission check. The route
/// layer merges request-derived field keys (for the current read routes,
/// percent-decoded query parameter names and `fields=` selections) into
/// `request_keys` before the check runs.
#[derive(Debug, Clone)]
pub struct PermissionSpec {
    pub code: PermissionCode,
    pub request_keys: HashSet<String>,
    pub deny_fields: HashSet<String>,
    pub allow_all_fields: bool,
}

impl PermissionSpec {
    pub fn new(code: PermissionCode) -> Self {
        Self {
            code,
            request_keys: HashSet::new(),
            deny_fields: HashSet::new(),
            allow_all_fields: true,
        }
    }

    pub fn deny_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_fields = fields.into_iter().map(Into::into).collect();
        self.allow_all_fields = false;
        self
    }

    pub fn request_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.request_keys = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Outcome of a single permission check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub allowed: bool,
    pub deny_fields: HashSet<String>,
    pub allow_all_fields: bool,
}

impl PermissionDecision {
    pub fn denied() -> Self {
        Self {
            allowed: false,
            deny_fields: HashSet::new(),
            allow_all_fields: false,
        }
    }

    /// Superusers bypass field-level restrictions along with everything else.
    pub fn superuser() -> Self {
        Self {
            allowed: true,
            deny_fields: HashSet::new(),
            allow_all_fields: true,
        }
    }
}
