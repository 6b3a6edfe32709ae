//! Security-relevant activity events.
//!
//! Handlers publish fire-and-forget events onto a broadcast bus; a listener
//! task projects them into the append-only `activity_log` table with a
//! SHA-256 hash chain so after-the-fact tampering is detectable. Role
//! mutations and refresh-token replays always land here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub subject_id: Option<Uuid>,
    pub severity: Severity,
    pub payload: Value,
}

pub type EventBus = broadcast::Sender<ActivityEvent>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<ActivityEvent>) {
    broadcast::channel(1024)
}

/// Publish an activity event for any entity implementing [`Loggable`].
/// Logging failures never break the request path.
pub fn log_activity<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
) {
    let event = ActivityEvent {
        id: Uuid::new_v4(),
        name: format!("{}.{}", T::entity_type(), action),
        occurred_at: Utc::now(),
        actor_id,
        subject_id: Some(entity.subject_id()),
        severity: entity.severity(),
        payload: serde_json::to_value(entity).unwrap_or_default(),
    };
    let _ = event_bus.send(event);
}

/// Publish a security event not tied to a stored entity (e.g. a refresh
/// token replay). Always Critical.
pub fn log_security_event(event_bus: &EventBus, name: &str, subject_id: Uuid, payload: Value) {
    let event = ActivityEvent {
        id: Uuid::new_v4(),
        name: name.to_string(),
        occurred_at: Utc::now(),
        actor_id: None,
        subject_id: Some(subject_id),
        severity: Severity::Critical,
        payload,
    };
    let _ = event_bus.send(event);
}

pub async fn start_activity_listener(
    mut rx: broadcast::Receiver<ActivityEvent>,
    pool: SqlitePool,
) {
    tracing::info!("activity listener started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(err) = persist_event(&pool, &event).await {
                    tracing::error!(error = %err, event = %event.name, "failed to save activity log");
                }
            }
            // Lagging drops the overwritten events but must not kill the
            // listener; the receiver is still live and repositioned.
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged, events lost");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn persist_event(pool: &SqlitePool, event: &ActivityEvent) -> Result<(), sqlx::Error> {
    let payload_str = serde_json::to_string(&event.payload).unwrap_or_default();

    // Chain each entry to its predecessor: hash = SHA256(prev_hash || payload)
    let prev_hash: Option<String> =
        sqlx::query_scalar("SELECT hash FROM activity_log ORDER BY occurred_at DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    if let Some(ref ph) = prev_hash {
        hasher.update(ph.as_bytes());
    }
    hasher.update(payload_str.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, event_name, actor_id, subject_id, occurred_at, properties, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.id.to_string())
    .bind(&event.name)
    .bind(event.actor_id.map(|u| u.to_string()))
    .bind(event.subject_id.map(|u| u.to_string()))
    .bind(event.occurred_at)
    .bind(&payload_str)
    .bind(event.severity.as_str())
    .bind(&prev_hash)
    .bind(&hash)
    .execute(pool)
    .await?;

    Ok(())
}

/// Role assignment change, logged at Critical severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleChange {
    pub user_id: Uuid,
    pub role: crate::rbac::RoleCode,
}

impl Loggable for RoleChange {
    fn entity_type() -> &'static str { "user_role" }
    fn subject_id(&self) -> Uuid { self.user_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn test_pool(dir: &tempfile::TempDir) -> SqlitePool {
        use sqlx::sqlite::SqliteConnectOptions;
        let opts = SqliteConnectOptions::new()
            .filename(dir.path().join("events.db"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        sqlx::migrate::Migrator::new(
            std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"),
        )
        .await
        .unwrap()
        .run(&pool)
        .await
        .unwrap();
        pool
    }

    fn event(name: &str) -> ActivityEvent {
        ActivityEvent {
            id: Uuid::new_v4(),
            name: name.to_string(),
            occurred_at: Utc::now(),
            actor_id: None,
            subject_id: Some(Uuid::new_v4()),
            severity: Severity::Important,
            payload: serde_json::json!({ "event": name }),
        }
    }

    async fn wait_for_rows(pool: &SqlitePool, expected: i64) {
        for _ in 0..50 {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM activity_log")
                .fetch_one(pool)
                .await
                .unwrap();
            if count >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("activity_log never reached {expected} rows");
    }

    #[tokio::test]
    async fn listener_keeps_running_after_lagging() {
        let dir = tempdir().unwrap();
        let pool = test_pool(&dir).await;

        // one-slot buffer, three sends: the receiver starts out lagged
        let (tx, rx) = broadcast::channel(1);
        for i in 0..3 {
            tx.send(event(&format!("burst.{i}"))).unwrap();
        }

        let listener = tokio::spawn(start_activity_listener(rx, pool.clone()));
        wait_for_rows(&pool, 1).await;

        // events published after the lag must still be persisted
        tx.send(event("after.lag")).unwrap();
        wait_for_rows(&pool, 2).await;

        drop(tx);
        listener.await.unwrap();
    }
}
