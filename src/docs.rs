//! OpenAPI document and Swagger UI wiring.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::AuthUser;
use crate::models;
use crate::rbac::{PermissionCode, RoleCode};
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::refresh,
        routes::auth::logout,
        routes::auth::me,
        routes::users::list_users,
        routes::users::get_user,
        routes::users::deactivate_user,
        routes::rbac::list_roles,
        routes::rbac::get_user_roles,
        routes::rbac::assign_role_to_user,
        routes::rbac::revoke_role_from_user,
        routes::rbac::effective_permissions,
    ),
    components(
        schemas(
            models::user::User,
            models::user::RegisterRequest,
            models::user::LoginRequest,
            models::user::RefreshRequest,
            models::user::TokenPairResponse,
            AuthUser,
            RoleCode,
            PermissionCode,
            routes::health::HealthResponse,
            routes::users::UserListResponse,
            routes::rbac::RoleInfo,
            routes::rbac::UserRolesResponse,
            routes::rbac::EffectivePermissionsResponse,
            routes::rbac::AssignRoleRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness probe"),
        (name = "Auth", description = "Authentication and session endpoints"),
        (name = "Users", description = "User directory"),
        (name = "RBAC", description = "Role and permission management")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Serve the generated document at `/api-docs/openapi.json` and the Swagger
/// UI at `/docs`, with the Authorize dialog persisting the bearer token.
pub fn swagger_routes() -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .persist_authorization(true);

    let doc_json =
        Arc::new(serde_json::to_value(ApiDoc::openapi()).expect("OpenAPI serialization must succeed"));

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}
