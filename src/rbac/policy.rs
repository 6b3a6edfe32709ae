use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

use super::code::RoleCode;
use crate::errors::AppError;

/// Direction of a role mutation, carried in hierarchy errors so the
/// boundary can phrase the conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleAction {
    Assign,
    Revoke,
}

impl fmt::Display for RoleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleAction::Assign => f.write_str("assign"),
            RoleAction::Revoke => f.write_str("revoke"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RbacError {
    #[error("insufficient privilege to {action} role {role}")]
    HierarchyViolation { action: RoleAction, role: RoleCode },
    #[error("cannot {action} roles on your own account")]
    SelfModification { action: RoleAction },
    #[error("cannot remove the last super_admin")]
    LastSuperAdmin,
    #[error("role {0} is already assigned")]
    AlreadyAssigned(RoleCode),
    #[error("role {0} is not assigned")]
    NotAssigned(RoleCode),
}

impl From<RbacError> for AppError {
    fn from(err: RbacError) -> Self {
        match &err {
            RbacError::HierarchyViolation { .. } => AppError::forbidden(err.to_string()),
            RbacError::SelfModification { .. }
            | RbacError::LastSuperAdmin
            | RbacError::AlreadyAssigned(_)
            | RbacError::NotAssigned(_) => AppError::conflict(err.to_string()),
        }
    }
}

/// Two-level hierarchy: super_admin manages every role, admin manages only
/// plain users, user manages nobody.
pub fn can_manage_role(actor_roles: &HashSet<RoleCode>, target_role: &RoleCode) -> bool {
    if actor_roles.contains(super::SUPER_ADMIN) {
        return true;
    }
    actor_roles.contains(super::ADMIN) && target_role.as_str() == super::USER
}

pub fn ensure_can_assign_role(
    actor_roles: &HashSet<RoleCode>,
    target_role: &RoleCode,
) -> Result<(), RbacError> {
    ensure_can_manage(actor_roles, target_role, RoleAction::Assign)
}

pub fn ensure_can_revoke_role(
    actor_roles: &HashSet<RoleCode>,
    target_role: &RoleCode,
) -> Result<(), RbacError> {
    ensure_can_manage(actor_roles, target_role, RoleAction::Revoke)
}

fn ensure_can_manage(
    actor_roles: &HashSet<RoleCode>,
    target_role: &RoleCode,
    action: RoleAction,
) -> Result<(), RbacError> {
    if can_manage_role(actor_roles, target_role) {
        Ok(())
    } else {
        Err(RbacError::HierarchyViolation {
            action,
            role: target_role.clone(),
        })
    }
}

/// Actors may never change their own role set, in either direction.
/// Blocks both privilege self-escalation and self-lockout.
pub fn ensure_not_self_role_change(
    actor_id: Uuid,
    target_user_id: Uuid,
    action: RoleAction,
) -> Result<(), RbacError> {
    if actor_id == target_user_id {
        Err(RbacError::SelfModification { action })
    } else {
        Ok(())
    }
}

/// The system must always retain at least one super_admin.
/// `remaining` is the count of super_admins left after the hypothetical
/// revoke.
pub fn ensure_not_last_super_admin(remaining: i64) -> Result<(), RbacError> {
    if remaining <= 0 {
        Err(RbacError::LastSuperAdmin)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(raw: &[&str]) -> HashSet<RoleCode> {
        raw.iter().map(|r| RoleCode::new(*r).unwrap()).collect()
    }

    #[test]
    fn hierarchy_truth_table() {
        let actor_sets = [
            roles(&["super_admin"]),
            roles(&["admin"]),
            roles(&["user"]),
        ];
        let targets = [RoleCode::super_admin(), RoleCode::admin(), RoleCode::user()];

        // rows: actor set, columns: target role
        let expected = [
            [true, true, true],    // super_admin manages everyone
            [false, false, true],  // admin manages only plain users
            [false, false, false], // user manages nobody
        ];

        for (i, actor) in actor_sets.iter().enumerate() {
            for (j, target) in targets.iter().enumerate() {
                assert_eq!(
                    can_manage_role(actor, target),
                    expected[i][j],
                    "actor {actor:?} target {target}"
                );
            }
        }
    }

    #[test]
    fn mixed_role_set_takes_strongest() {
        let actor = roles(&["user", "admin"]);
        assert!(can_manage_role(&actor, &RoleCode::user()));
        assert!(!can_manage_role(&actor, &RoleCode::admin()));

        let actor = roles(&["admin", "super_admin"]);
        assert!(can_manage_role(&actor, &RoleCode::super_admin()));
    }

    #[test]
    fn empty_actor_set_manages_nothing() {
        let actor = HashSet::new();
        for target in [RoleCode::super_admin(), RoleCode::admin(), RoleCode::user()] {
            assert!(!can_manage_role(&actor, &target));
        }
    }

    #[test]
    fn assign_and_revoke_report_the_action() {
        let actor = roles(&["admin"]);
        let err = ensure_can_assign_role(&actor, &RoleCode::admin()).unwrap_err();
        assert_eq!(
            err,
            RbacError::HierarchyViolation {
                action: RoleAction::Assign,
                role: RoleCode::admin()
            }
        );

        let err = ensure_can_revoke_role(&actor, &RoleCode::super_admin()).unwrap_err();
        assert!(matches!(
            err,
            RbacError::HierarchyViolation {
                action: RoleAction::Revoke,
                ..
            }
        ));
    }

    #[test]
    fn self_role_change_always_blocked() {
        let id = Uuid::new_v4();
        for action in [RoleAction::Assign, RoleAction::Revoke] {
            let err = ensure_not_self_role_change(id, id, action).unwrap_err();
            assert!(matches!(err, RbacError::SelfModification { .. }));
        }
        assert!(ensure_not_self_role_change(id, Uuid::new_v4(), RoleAction::Revoke).is_ok());
    }

    #[test]
    fn last_super_admin_guard() {
        assert_eq!(
            ensure_not_last_super_admin(0),
            Err(RbacError::LastSuperAdmin)
        );
        assert_eq!(
            ensure_not_last_super_admin(-1),
            Err(RbacError::LastSuperAdmin)
        );
        assert!(ensure_not_last_super_admin(1).is_ok());
    }

    #[test]
    fn hierarchy_errors_map_to_forbidden() {
        let err: AppError = RbacError::HierarchyViolation {
            action: RoleAction::Assign,
            role: RoleCode::admin(),
        }
        .into();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err: AppError = RbacError::LastSuperAdmin.into();
        assert!(matches!(err, AppError::Conflict(..)));
    }
}
