use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::auth::{AuthUser, CurrentUser};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity, log_security_event};
use crate::models::user::{
    LoginRequest, RefreshRequest, RegisterRequest, TokenPairResponse, User,
};
use crate::rbac::RoleCode;
use crate::refresh::RefreshError;
use crate::store::NewUser;
use crate::utils::{device_fingerprint, hash_password, verify_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = TokenPairResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<TokenPairResponse>)> {
    let password_hash = hash_password(&payload.password)?;

    let db_user = state
        .store
        .create_user(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
        })
        .await?;

    // every account starts as a plain user
    state.store.assign_role(db_user.id, &RoleCode::user()).await?;

    let user: User = db_user.into();
    log_activity(&state.event_bus, "registered", Some(user.id), &user);

    let pair = issue_token_pair(&state, &headers, user).await?;
    Ok((StatusCode::CREATED, Json(pair)))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPairResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<TokenPairResponse>> {
    let db_user = state
        .store
        .find_user_by_email(&payload.email)
        .await?
        .ok_or_else(|| AppError::unauthenticated("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    // inactive accounts get the same answer as a wrong password
    if !password_ok || !db_user.is_active {
        return Err(AppError::unauthenticated("invalid credentials"));
    }

    let user: User = db_user.into();
    let pair = issue_token_pair(&state, &headers, user).await?;
    Ok(Json(pair))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = TokenPairResponse),
        (status = 401, description = "Refresh token invalid or replayed")
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<TokenPairResponse>> {
    let (user_id, fingerprint) = state.tokens.verify_refresh(&payload.refresh_token)?;

    // a subject that no longer resolves, or was deactivated, reads the same
    // as a bad token
    let db_user = match state.store.get_user_by_id(user_id).await {
        Ok(user) if user.is_active => user,
        Ok(_) => return Err(AppError::invalid_token()),
        Err(crate::store::StoreError::NotFound) => return Err(AppError::invalid_token()),
        Err(err) => return Err(err.into()),
    };

    let access_token = state.tokens.issue_access(user_id)?;
    let refresh_token = state.tokens.issue_refresh(user_id, &fingerprint)?;

    match state
        .refresh
        .rotate(user_id, &fingerprint, &payload.refresh_token, &refresh_token)
        .await
    {
        Ok(()) => {}
        Err(err @ RefreshError::Replay) => {
            log_security_event(
                &state.event_bus,
                "auth.refresh_replay",
                user_id,
                serde_json::json!({ "fingerprint": fingerprint }),
            );
            return Err(err.into());
        }
        Err(err) => return Err(err.into()),
    }

    Ok(Json(TokenPairResponse {
        access_token,
        refresh_token,
        user: db_user.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Refresh token revoked"))
)]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
) -> AppResult<Json<MessageResponse>> {
    let fingerprint = device_fingerprint(&headers);
    state.refresh.revoke(user.id, &fingerprint).await;

    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    security(("bearerAuth" = [])),
    responses((status = 200, description = "Current identity snapshot", body = AuthUser))
)]
pub async fn me(CurrentUser(user): CurrentUser) -> Json<AuthUser> {
    Json(user)
}

/// Issue an access/refresh pair and install the refresh token as the single
/// valid record for this device, replacing whatever was there before.
async fn issue_token_pair(
    state: &AppState,
    headers: &HeaderMap,
    user: User,
) -> AppResult<TokenPairResponse> {
    let fingerprint = device_fingerprint(headers);
    let access_token = state.tokens.issue_access(user.id)?;
    let refresh_token = state.tokens.issue_refresh(user.id, &fingerprint)?;

    // a fresh login supersedes any previous session on this device
    state.refresh.revoke(user.id, &fingerprint).await;
    state
        .refresh
        .rotate(user.id, &fingerprint, "", &refresh_token)
        .await
        .map_err(AppError::from)?;

    Ok(TokenPairResponse {
        access_token,
        refresh_token,
        user,
    })
}
