use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;
use uuid::Uuid;

use warden::create_app;

async fn setup(dir: &tempfile::TempDir) -> Result<(Router, SqlitePool)> {
    let db_path = dir.path().join("test_users.db");
    use sqlx::sqlite::SqliteConnectOptions;
    let opts = SqliteConnectOptions::new()
        .filename(db_path.as_path())
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
    )
    .await?;
    migrator.run(&pool).await?;

    std::env::set_var("JWT_SECRET", "test-secret");
    let app = create_app(pool.clone()).await.context("failed to build app")?;
    Ok((app, pool))
}

async fn read_json(resp: Response) -> Result<Value> {
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn register(app: &Router, name: &str, email: &str) -> Result<(Uuid, String)> {
    let payload = json!({"name": name, "email": email, "password": "password123"});
    let req = Request::builder()
        .method("POST")
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body = read_json(resp).await?;
    let id = body
        .pointer("/user/id")
        .and_then(Value::as_str)
        .context("missing user id")?;
    let token = body
        .get("access_token")
        .and_then(Value::as_str)
        .context("missing access token")?;
    Ok((Uuid::parse_str(id)?, token.to_string()))
}

async fn grant_role(pool: &SqlitePool, user_id: Uuid, role: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_code) VALUES (?, ?)")
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await?;
    Ok(())
}

fn get(uri: &str, token: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())?)
}

#[tokio::test]
async fn listing_never_exposes_password_hashes() -> Result<()> {
    let dir = tempdir()?;
    let (app, pool) = setup(&dir).await?;

    let (admin_id, admin_token) = register(&app, "Admin", "admin@example.com").await?;
    grant_role(&pool, admin_id, "admin").await?;
    register(&app, "Bob", "bob@example.com").await?;

    let resp = app.clone().oneshot(get("/users", &admin_token)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await?;
    let users = body.get("users").and_then(Value::as_array).unwrap();
    assert_eq!(users.len(), 2);
    for user in users {
        assert!(user.get("password_hash").is_none());
        assert!(user.get("email").is_some());
    }

    Ok(())
}

#[tokio::test]
async fn requesting_a_denied_field_is_forbidden() -> Result<()> {
    let dir = tempdir()?;
    let (app, pool) = setup(&dir).await?;

    let (admin_id, admin_token) = register(&app, "Admin", "admin@example.com").await?;
    grant_role(&pool, admin_id, "admin").await?;
    let (super_id, super_token) = register(&app, "Root", "root@example.com").await?;
    grant_role(&pool, super_id, "super_admin").await?;

    // harmless field selections pass
    let resp = app
        .clone()
        .oneshot(get("/users?fields=email,name", &admin_token)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // naming the denied column trips the field gate
    let resp = app
        .clone()
        .oneshot(get("/users?fields=password_hash", &admin_token)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = read_json(resp).await?;
    assert_eq!(
        body.get("message").and_then(Value::as_str),
        Some("field password_hash is not accessible")
    );

    // a percent-encoded spelling of the same column is decoded before the
    // deny check, so it trips the gate too
    let resp = app
        .clone()
        .oneshot(get("/users?fields=password%5Fhash", &admin_token)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // same on the detail route
    let resp = app
        .clone()
        .oneshot(get(
            &format!("/users/{super_id}?fields=password_hash"),
            &admin_token,
        )?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // superusers are not subject to field restrictions
    let resp = app
        .clone()
        .oneshot(get("/users?fields=password_hash", &super_token)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn deactivation_locks_the_account_out() -> Result<()> {
    let dir = tempdir()?;
    let (app, pool) = setup(&dir).await?;

    let (super_id, super_token) = register(&app, "Root", "root@example.com").await?;
    grant_role(&pool, super_id, "super_admin").await?;
    let (bob_id, bob_token) = register(&app, "Bob", "bob@example.com").await?;

    // Bob authenticates fine beforehand (and primes the auth cache)
    let resp = app.clone().oneshot(get("/auth/me", &bob_token)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/users/{bob_id}/deactivate"))
        .header("authorization", format!("Bearer {super_token}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await?;
    assert_eq!(body.get("is_active").and_then(Value::as_bool), Some(false));

    // the still-valid JWT no longer authenticates: the cache was invalidated
    // and storage now says inactive
    let resp = app.clone().oneshot(get("/auth/me", &bob_token)?).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // and logging in again is refused like a bad password
    let payload = json!({"email": "bob@example.com", "password": "password123"});
    let req = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn unknown_user_detail_is_a_404() -> Result<()> {
    let dir = tempdir()?;
    let (app, pool) = setup(&dir).await?;

    let (super_id, super_token) = register(&app, "Root", "root@example.com").await?;
    grant_role(&pool, super_id, "super_admin").await?;

    let resp = app
        .clone()
        .oneshot(get(&format!("/users/{}", Uuid::new_v4()), &super_token)?)
        .await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}
