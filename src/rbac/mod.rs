//! Role-based access control core.
//!
//! Three fixed roles form a two-level management hierarchy
//! (`super_admin` > `admin` > `user`) over a closed set of
//! `domain:action` permission codes. The registry maps each role to the
//! permissions it grants; the policy functions gate who may assign or
//! revoke which role.

mod code;
mod policy;
mod registry;

pub use code::{CodeError, PermissionCode, RoleCode};
pub use policy::{
    can_manage_role, ensure_can_assign_role, ensure_can_revoke_role,
    ensure_not_last_super_admin, ensure_not_self_role_change, RbacError, RoleAction,
};
pub use registry::RoleRegistry;

/// Well-known role names
pub const SUPER_ADMIN: &str = "super_admin";
pub const ADMIN: &str = "admin";
pub const USER: &str = "user";

/// Well-known permission names (the closed system set)
pub mod permissions {
    pub const USERS_READ: &str = "users:read";
    pub const USERS_CREATE: &str = "users:create";
    pub const USERS_UPDATE: &str = "users:update";
    pub const USERS_DELETE: &str = "users:delete";

    pub const RBAC_READ: &str = "rbac:read";
    pub const RBAC_ASSIGN_ROLE: &str = "rbac:assign_role";
    pub const RBAC_REVOKE_ROLE: &str = "rbac:revoke_role";

    pub const ALL: &[&str] = &[
        USERS_READ,
        USERS_CREATE,
        USERS_UPDATE,
        USERS_DELETE,
        RBAC_READ,
        RBAC_ASSIGN_ROLE,
        RBAC_REVOKE_ROLE,
    ];
}
