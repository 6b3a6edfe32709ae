use std::collections::{HashMap, HashSet};

use super::code::{PermissionCode, RoleCode};
use super::permissions;

/// Immutable role -> permission mapping, built once at startup and shared
/// through the app state. Unknown roles resolve to the empty set.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    grants: HashMap<RoleCode, HashSet<PermissionCode>>,
    all_permissions: Vec<PermissionCode>,
}

impl RoleRegistry {
    pub fn new(grants: HashMap<RoleCode, HashSet<PermissionCode>>) -> Self {
        let mut all_permissions: Vec<PermissionCode> = permissions::ALL
            .iter()
            .map(|code| PermissionCode::well_known(code))
            .collect();
        all_permissions.sort();
        Self {
            grants,
            all_permissions,
        }
    }

    /// The registry shipped with the system: `user` holds nothing, `admin`
    /// manages users and user-role membership, `super_admin` holds everything
    /// admin does plus user deletion. Admin carries the role-management codes
    /// because the permission check runs before the hierarchy gate; which
    /// target roles an admin may actually touch is decided by
    /// [`super::policy::can_manage_role`].
    pub fn builtin() -> Self {
        let admin_grants: HashSet<PermissionCode> = [
            permissions::USERS_READ,
            permissions::USERS_CREATE,
            permissions::USERS_UPDATE,
            permissions::RBAC_READ,
            permissions::RBAC_ASSIGN_ROLE,
            permissions::RBAC_REVOKE_ROLE,
        ]
        .into_iter()
        .map(PermissionCode::well_known)
        .collect();

        let mut super_admin_grants = admin_grants.clone();
        super_admin_grants.extend(
            [permissions::USERS_DELETE]
                .into_iter()
                .map(PermissionCode::well_known),
        );

        let mut grants = HashMap::new();
        grants.insert(RoleCode::user(), HashSet::new());
        grants.insert(RoleCode::admin(), admin_grants);
        grants.insert(RoleCode::super_admin(), super_admin_grants);

        Self::new(grants)
    }

    pub fn permissions_for(&self, role: &RoleCode) -> HashSet<PermissionCode> {
        self.grants.get(role).cloned().unwrap_or_default()
    }

    /// Union of grants over all roles. Roles absent from the registry
    /// contribute nothing rather than erroring.
    pub fn permissions_for_roles<'a, I>(&self, roles: I) -> HashSet<PermissionCode>
    where
        I: IntoIterator<Item = &'a RoleCode>,
    {
        let mut out = HashSet::new();
        for role in roles {
            if let Some(grants) = self.grants.get(role) {
                out.extend(grants.iter().cloned());
            }
        }
        out
    }

    pub fn knows_role(&self, role: &RoleCode) -> bool {
        self.grants.contains_key(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleCode> {
        self.grants.keys()
    }

    /// The closed permission-code enumeration. Cache invalidation walks this
    /// because it cannot know which decisions were cached.
    pub fn all_permission_codes(&self) -> &[PermissionCode] {
        &self.all_permissions
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
