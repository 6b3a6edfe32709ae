//! User listing and lifecycle endpoints.
//!
//! These routes exercise field-level enforcement: the caller's requested
//! field keys (query parameter names plus any `fields=` selection) are
//! merged into the permission spec, and a hit on the deny list fails the
//! request unless the decision allows all fields (superuser).

use std::collections::HashSet;

use axum::extract::{Path, RawQuery, State};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{CurrentUser, PermissionSpec};
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::models::user::User;
use crate::rbac::{permissions, PermissionCode};

/// Columns that never leave the storage layer via this API.
const DENIED_FIELDS: &[&str] = &["password_hash"];

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub users: Vec<User>,
}

/// Field keys a request touches: every query parameter name, plus the
/// values of any comma-separated `fields` selector. Names and values are
/// percent-decoded first so an encoded spelling like `password%5Fhash`
/// matches the deny list the same as the plain one.
fn request_keys(query: Option<&str>) -> HashSet<String> {
    let mut keys = HashSet::new();
    let Some(query) = query else {
        return keys;
    };

    for pair in query.split('&') {
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = decode(raw_name);
        if name.is_empty() {
            continue;
        }
        if name == "fields" {
            for field in decode(raw_value).split(',') {
                let field = field.trim();
                if !field.is_empty() {
                    keys.insert(field.to_string());
                }
            }
        }
        keys.insert(name.into_owned());
    }
    keys
}

fn decode(raw: &str) -> std::borrow::Cow<'_, str> {
    // invalid UTF-8 in an escape falls back to the raw text
    urlencoding::decode(raw).unwrap_or(std::borrow::Cow::Borrowed(raw))
}

fn read_spec(query: Option<&str>) -> PermissionSpec {
    PermissionSpec::new(PermissionCode::well_known(permissions::USERS_READ))
        .deny_fields(DENIED_FIELDS.iter().copied())
        .request_keys(request_keys(query))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "All users", body = UserListResponse),
        (status = 403, description = "Missing permission or denied field requested")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    RawQuery(query): RawQuery,
) -> AppResult<Json<UserListResponse>> {
    state
        .authenticator
        .require(actor.id, &read_spec(query.as_deref()))
        .await?;

    let users = state
        .store
        .list_users()
        .await?
        .into_iter()
        .map(User::from)
        .collect();

    Ok(Json(UserListResponse { users }))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "User detail", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<Uuid>,
    RawQuery(query): RawQuery,
) -> AppResult<Json<User>> {
    state
        .authenticator
        .require(actor.id, &read_spec(query.as_deref()))
        .await?;

    let user = state.store.get_user_by_id(user_id).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/users/{user_id}/deactivate",
    tag = "Users",
    params(("user_id" = Uuid, Path, description = "User ID")),
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "User deactivated", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn deactivate_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    state
        .authenticator
        .require(
            actor.id,
            &PermissionSpec::new(PermissionCode::well_known(permissions::USERS_UPDATE)),
        )
        .await?;

    state.store.set_active(user_id, false).await?;
    let user: User = state.store.get_user_by_id(user_id).await?.into();

    // cached identity and decisions for this user are now stale
    state.authenticator.cache().invalidate_user(user_id).await;
    log_activity(&state.event_bus, "deactivated", Some(actor.id), &user);

    Ok(Json(user))
}
