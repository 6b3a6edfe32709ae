use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::util::ServiceExt;

use warden::create_app;

async fn setup(dir: &tempfile::TempDir) -> Result<Router> {
    let db_path = dir.path().join("test_refresh.db");
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
    create_app(pool).await.context("failed to build app")
}

async fn read_json(resp: Response) -> Result<Value> {
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn post_json(app: &Router, uri: &str, payload: &Value) -> Result<Response> {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))?;
    Ok(app.clone().oneshot(req).await?)
}

#[tokio::test]
async fn rotation_chain_and_replay_detection() -> Result<()> {
    let dir = tempdir()?;
    let app = setup(&dir).await?;

    // Register; the response carries the first refresh token for this device
    let resp = post_json(
        &app,
        "/auth/register",
        &json!({"name": "Ada", "email": "ada@example.com", "password": "password123"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let pair = read_json(resp).await?;
    let refresh_1 = pair
        .get("refresh_token")
        .and_then(Value::as_str)
        .context("missing refresh_token")?
        .to_string();

    // 1. Rotate: old token in, new pair out
    let resp = post_json(&app, "/auth/refresh", &json!({"refresh_token": refresh_1})).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let rotated = read_json(resp).await?;
    let refresh_2 = rotated
        .get("refresh_token")
        .and_then(Value::as_str)
        .context("missing rotated refresh_token")?
        .to_string();
    assert_ne!(refresh_1, refresh_2);

    // 2. Replaying the superseded token is rejected
    let resp = post_json(&app, "/auth/refresh", &json!({"refresh_token": refresh_1})).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // 3. Replay detection killed the whole chain: the current token is gone too
    let resp = post_json(&app, "/auth/refresh", &json!({"refresh_token": refresh_2})).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn garbage_refresh_token_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let app = setup(&dir).await?;

    let resp = post_json(
        &app,
        "/auth/refresh",
        &json!({"refresh_token": "not-a-jwt-at-all"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_device_session() -> Result<()> {
    let dir = tempdir()?;
    let app = setup(&dir).await?;

    let resp = post_json(
        &app,
        "/auth/register",
        &json!({"name": "Ada", "email": "ada@example.com", "password": "password123"}),
    )
    .await?;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let pair = read_json(resp).await?;
    let access = pair
        .get("access_token")
        .and_then(Value::as_str)
        .context("missing access_token")?
        .to_string();
    let refresh = pair
        .get("refresh_token")
        .and_then(Value::as_str)
        .context("missing refresh_token")?
        .to_string();

    let req = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header("authorization", format!("Bearer {access}"))
        .body(Body::empty())?;
    let resp = app.clone().oneshot(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    // the refresh token stored for this device no longer rotates
    let resp = post_json(&app, "/auth/refresh", &json!({"refresh_token": refresh})).await?;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    Ok(())
}
