use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use super::AuthUser;
use crate::app::AppState;
use crate::errors::AppError;

/// Per-request authentication state, attached by [`auth_context`] before
/// routing. `None` means no bearer token was presented; public routes accept
/// that, protected extractors reject it.
#[derive(Debug, Clone, Default)]
pub struct AuthContext(pub Option<AuthUser>);

/// Runs once per request. A missing Authorization header is not an error at
/// this stage (some routes are public); a header that is present but does
/// not verify rejects the request outright.
pub async fn auth_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned);

    let context = match bearer {
        None => AuthContext(None),
        Some(token) => {
            let user_id = state.tokens.verify_access(&token)?;
            // an id that no longer resolves reads the same as a bad token
            let user = state
                .authenticator
                .authenticate(user_id)
                .await?
                .ok_or_else(AppError::invalid_token)?;
            if !user.is_active {
                return Err(AppError::invalid_token());
            }
            AuthContext(Some(user))
        }
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Rejects with 401 unless the request carries an authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub AuthUser);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_default();

        context
            .0
            .map(CurrentUser)
            .ok_or_else(|| AppError::unauthenticated("Authentication required"))
    }
}

/// Optional-auth routes: proceeds whether or not a user is present.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_default();
        Ok(MaybeUser(context.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use uuid::Uuid;

    fn parts_with(context: Option<AuthContext>) -> Parts {
        let mut request = axum::http::Request::builder()
            .body(axum::body::Body::empty())
            .unwrap();
        if let Some(context) = context {
            request.extensions_mut().insert(context);
        }
        request.into_parts().0
    }

    fn auth_user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: None,
            roles: HashSet::new(),
            permissions: HashSet::new(),
            is_active: true,
            is_admin: false,
            is_superuser: false,
        }
    }

    #[tokio::test]
    async fn current_user_rejects_anonymous_requests() {
        let mut parts = parts_with(Some(AuthContext(None)));
        let err = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));

        // no middleware ran at all
        let mut parts = parts_with(None);
        assert!(CurrentUser::from_request_parts(&mut parts, &()).await.is_err());
    }

    #[tokio::test]
    async fn current_user_unwraps_the_authenticated_identity() {
        let user = auth_user();
        let mut parts = parts_with(Some(AuthContext(Some(user.clone()))));
        let CurrentUser(extracted) = CurrentUser::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(extracted.id, user.id);
    }

    #[tokio::test]
    async fn maybe_user_accepts_both_cases() {
        let mut parts = parts_with(Some(AuthContext(None)));
        let MaybeUser(none) = MaybeUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(none.is_none());

        let user = auth_user();
        let mut parts = parts_with(Some(AuthContext(Some(user.clone()))));
        let MaybeUser(some) = MaybeUser::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(some.map(|u| u.id), Some(user.id));
    }
}
