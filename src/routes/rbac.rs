//! Role management API.
//!
//! Every mutation passes the full set of policy gates (hierarchy,
//! self-modification, last-super-admin, idempotency) before touching
//! storage, then invalidates the target's auth cache and logs a Critical
//! activity event.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{CurrentUser, PermissionSpec};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, RoleChange};
use crate::rbac::{self, permissions, PermissionCode, RbacError, RoleCode};

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleInfo {
    pub code: RoleCode,
    pub permissions: Vec<PermissionCode>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserRolesResponse {
    pub user_id: Uuid,
    pub roles: Vec<RoleCode>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EffectivePermissionsResponse {
    pub user_id: Uuid,
    pub roles: Vec<RoleCode>,
    pub permissions: Vec<PermissionCode>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role: RoleCode,
}

fn require_spec(code: &'static str) -> PermissionSpec {
    PermissionSpec::new(PermissionCode::well_known(code))
}

#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Registry view", body = Vec<RoleInfo>))
)]
pub async fn list_roles(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> AppResult<Json<Vec<RoleInfo>>> {
    state
        .authenticator
        .require(actor.id, &require_spec(permissions::RBAC_READ))
        .await?;

    let mut roles: Vec<RoleInfo> = state
        .registry
        .roles()
        .map(|code| {
            let mut permissions: Vec<PermissionCode> =
                state.registry.permissions_for(code).into_iter().collect();
            permissions.sort();
            RoleInfo {
                code: code.clone(),
                permissions,
            }
        })
        .collect();
    roles.sort_by(|a, b| a.code.cmp(&b.code));

    Ok(Json(roles))
}

#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/roles",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Assigned roles", body = UserRolesResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user_roles(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserRolesResponse>> {
    state
        .authenticator
        .require(actor.id, &require_spec(permissions::RBAC_READ))
        .await?;

    state.store.get_user_by_id(user_id).await?;
    let mut roles: Vec<RoleCode> = state.store.get_user_roles(user_id).await?.into_iter().collect();
    roles.sort();

    Ok(Json(UserRolesResponse { user_id, roles }))
}

#[utoipa::path(
    post,
    path = "/rbac/users/{user_id}/roles",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = AssignRoleRequest,
    security(("bearerAuth" = [])),
    responses(
        (status = 201, description = "Role assigned"),
        (status = 403, description = "Hierarchy violation"),
        (status = 409, description = "Self-modification or already assigned"),
        (status = 404, description = "User or role not found")
    )
)]
pub async fn assign_role_to_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AssignRoleRequest>,
) -> AppResult<StatusCode> {
    state
        .authenticator
        .require(actor.id, &require_spec(permissions::RBAC_ASSIGN_ROLE))
        .await?;

    if !state.registry.knows_role(&req.role) {
        return Err(AppError::not_found(format!("unknown role {}", req.role)));
    }

    rbac::ensure_not_self_role_change(actor.id, user_id, rbac::RoleAction::Assign)?;
    rbac::ensure_can_assign_role(&actor.roles, &req.role)?;

    state.store.get_user_by_id(user_id).await?;

    let inserted = state.store.assign_role(user_id, &req.role).await?;
    if !inserted {
        return Err(RbacError::AlreadyAssigned(req.role).into());
    }

    state.authenticator.cache().invalidate_user(user_id).await;
    log_activity(
        &state.event_bus,
        "assigned",
        Some(actor.id),
        &RoleChange {
            user_id,
            role: req.role,
        },
    );

    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/rbac/users/{user_id}/roles/{role_code}",
    tag = "RBAC",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        ("role_code" = String, Path, description = "Role code")
    ),
    security(("bearerAuth" = [])),
    responses(
        (status = 204, description = "Role revoked"),
        (status = 403, description = "Hierarchy violation"),
        (status = 409, description = "Self-modification, not assigned, or last super_admin"),
        (status = 404, description = "User or role not found")
    )
)]
pub async fn revoke_role_from_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path((user_id, role_code)): Path<(Uuid, String)>,
) -> AppResult<StatusCode> {
    state
        .authenticator
        .require(actor.id, &require_spec(permissions::RBAC_REVOKE_ROLE))
        .await?;

    let role = RoleCode::new(role_code)
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    if !state.registry.knows_role(&role) {
        return Err(AppError::not_found(format!("unknown role {role}")));
    }

    rbac::ensure_not_self_role_change(actor.id, user_id, rbac::RoleAction::Revoke)?;
    rbac::ensure_can_revoke_role(&actor.roles, &role)?;

    state.store.get_user_by_id(user_id).await?;

    let target_roles = state.store.get_user_roles(user_id).await?;
    if !target_roles.contains(&role) {
        return Err(RbacError::NotAssigned(role).into());
    }

    // the system must never be left without a super_admin
    if role.as_str() == rbac::SUPER_ADMIN {
        let total = state.store.count_users_with_role(&role).await?;
        rbac::ensure_not_last_super_admin(total - 1)?;
    }

    let removed = state.store.revoke_role(user_id, &role).await?;
    if !removed {
        return Err(RbacError::NotAssigned(role).into());
    }

    state.authenticator.cache().invalidate_user(user_id).await;
    log_activity(
        &state.event_bus,
        "revoked",
        Some(actor.id),
        &RoleChange { user_id, role },
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/rbac/users/{user_id}/permissions",
    tag = "RBAC",
    params(("user_id" = Uuid, Path, description = "User ID")),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Effective permissions", body = EffectivePermissionsResponse),
        (status = 404, description = "User not found")
    )
)]
pub async fn effective_permissions(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<EffectivePermissionsResponse>> {
    state
        .authenticator
        .require(actor.id, &require_spec(permissions::RBAC_READ))
        .await?;

    state.store.get_user_by_id(user_id).await?;
    let role_set = state.store.get_user_roles(user_id).await?;

    let mut permissions: Vec<PermissionCode> = state
        .registry
        .permissions_for_roles(role_set.iter())
        .into_iter()
        .collect();
    permissions.sort();

    let mut roles: Vec<RoleCode> = role_set.into_iter().collect();
    roles.sort();

    Ok(Json(EffectivePermissionsResponse {
        user_id,
        roles,
        permissions,
    }))
}
