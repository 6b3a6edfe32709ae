use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::middleware;
use axum::routing::MethodRouter;
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{auth_context, Authenticator};
use crate::cache::{AuthCache, MemoryCache};
use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::lock::MemoryLock;
use crate::rbac::RoleRegistry;
use crate::refresh::RefreshTokenStore;
use crate::routes::{auth, health, rbac, users};
use crate::store::{SqliteUserStore, UserStore};
use crate::token::TokenConfig;

/// Prefixes that may carry routes reachable without authentication.
/// Everything else must declare auth-required in the manifest.
const PUBLIC_PREFIXES: &[&str] = &["/health", "/auth/register", "/auth/login", "/auth/refresh"];

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub tokens: Arc<TokenConfig>,
    pub registry: Arc<RoleRegistry>,
    pub authenticator: Authenticator,
    pub refresh: RefreshTokenStore,
    pub event_bus: EventBus,
}

/// One row per routable path: handler plus the auth posture the startup
/// check enforces.
struct RouteDef {
    path: &'static str,
    auth_required: bool,
    handler: MethodRouter<AppState>,
}

fn route_manifest() -> Vec<RouteDef> {
    use axum::routing::{delete, get, post};

    vec![
        RouteDef {
            path: "/health",
            auth_required: false,
            handler: get(health::health),
        },
        RouteDef {
            path: "/auth/register",
            auth_required: false,
            handler: post(auth::register),
        },
        RouteDef {
            path: "/auth/login",
            auth_required: false,
            handler: post(auth::login),
        },
        RouteDef {
            path: "/auth/refresh",
            auth_required: false,
            handler: post(auth::refresh),
        },
        RouteDef {
            path: "/auth/logout",
            auth_required: true,
            handler: post(auth::logout),
        },
        RouteDef {
            path: "/auth/me",
            auth_required: true,
            handler: get(auth::me),
        },
        RouteDef {
            path: "/users",
            auth_required: true,
            handler: get(users::list_users),
        },
        RouteDef {
            path: "/users/:user_id",
            auth_required: true,
            handler: get(users::get_user),
        },
        RouteDef {
            path: "/users/:user_id/deactivate",
            auth_required: true,
            handler: post(users::deactivate_user),
        },
        RouteDef {
            path: "/rbac/roles",
            auth_required: true,
            handler: get(rbac::list_roles),
        },
        RouteDef {
            path: "/rbac/users/:user_id/roles",
            auth_required: true,
            handler: get(rbac::get_user_roles).post(rbac::assign_role_to_user),
        },
        RouteDef {
            path: "/rbac/users/:user_id/roles/:role_code",
            auth_required: true,
            handler: delete(rbac::revoke_role_from_user),
        },
        RouteDef {
            path: "/rbac/users/:user_id/permissions",
            auth_required: true,
            handler: get(rbac::effective_permissions),
        },
    ]
}

/// Closed-by-default posture, checked once at startup: a route outside the
/// public prefixes that does not declare auth-required is a configuration
/// error, never a runtime 200.
fn assert_closed_by_default(routes: &[RouteDef]) -> Result<(), AppError> {
    for route in routes {
        let public = PUBLIC_PREFIXES
            .iter()
            .any(|prefix| route.path.starts_with(prefix));
        if !public && !route.auth_required {
            return Err(AppError::configuration(format!(
                "route {} is outside the public prefixes but does not require auth",
                route.path
            )));
        }
    }
    Ok(())
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let tokens = Arc::new(TokenConfig::from_env()?);
    let registry = Arc::new(RoleRegistry::builtin());

    let kv = Arc::new(MemoryCache::new());
    let auth_cache = AuthCache::new(kv.clone(), registry.clone());
    let refresh = RefreshTokenStore::new(
        kv,
        Arc::new(MemoryLock::new()),
        Duration::from_secs(tokens.refresh_ttl_secs.max(0) as u64),
    );

    let store: Arc<dyn UserStore> = Arc::new(SqliteUserStore::new(pool.clone()));
    let authenticator = Authenticator::new(store.clone(), auth_cache, registry.clone());

    let (event_bus, event_rx) = events::init_event_bus();
    tokio::spawn(events::start_activity_listener(event_rx, pool));

    let state = AppState {
        store,
        tokens,
        registry,
        authenticator,
        refresh,
        event_bus,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let manifest = route_manifest();
    assert_closed_by_default(&manifest)?;

    let mut router = Router::new();
    for route in manifest {
        router = router.route(route.path, route.handler);
    }

    let router = router
        .layer(middleware::from_fn_with_state(state.clone(), auth_context))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    async fn noop() {}

    #[test]
    fn manifest_passes_closed_by_default() {
        assert!(assert_closed_by_default(&route_manifest()).is_ok());
    }

    #[test]
    fn unflagged_private_route_fails_startup() {
        let routes = vec![RouteDef {
            path: "/admin/secrets",
            auth_required: false,
            handler: get(noop),
        }];
        let err = assert_closed_by_default(&routes).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn public_prefix_route_may_skip_auth() {
        let routes = vec![RouteDef {
            path: "/auth/login",
            auth_required: false,
            handler: get(noop),
        }];
        assert!(assert_closed_by_default(&routes).is_ok());
    }
}
