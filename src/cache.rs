//! Key-value cache port and the auth-specific read-through cache.
//!
//! The cache is advisory, never authoritative: a miss or a malformed entry
//! always falls back to live resolution against storage.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{AuthUser, PermissionDecision};
use crate::rbac::{PermissionCode, RoleRegistry};

/// Identity snapshots are re-resolved at most every five minutes.
pub const USER_TTL: Duration = Duration::from_secs(300);
/// Permission decisions are cheaper to recompute and staleness here delays
/// revocations, so their window is much shorter.
pub const PERMISSION_TTL: Duration = Duration::from_secs(30);

#[async_trait]
pub trait KeyValueCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
    async fn delete(&self, key: &str);
}

/// In-process cache adapter. Entries expire lazily on read; a production
/// deployment swaps in a shared store behind the same trait.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }
}

/// Short-TTL cache of resolved identities and per-permission decisions,
/// keyed by user id.
#[derive(Clone)]
pub struct AuthCache {
    inner: Arc<dyn KeyValueCache>,
    registry: Arc<RoleRegistry>,
}

impl AuthCache {
    pub fn new(inner: Arc<dyn KeyValueCache>, registry: Arc<RoleRegistry>) -> Self {
        Self { inner, registry }
    }

    fn user_key(user_id: Uuid) -> String {
        format!("auth:user:{user_id}")
    }

    fn permission_key(user_id: Uuid, code: &PermissionCode) -> String {
        format!("auth:perm:{user_id}:{code}")
    }

    pub async fn lookup_user(&self, user_id: Uuid) -> Option<AuthUser> {
        self.lookup(&Self::user_key(user_id)).await
    }

    pub async fn store_user(&self, user: &AuthUser) {
        self.store(&Self::user_key(user.id), user, USER_TTL).await;
    }

    pub async fn lookup_permission(
        &self,
        user_id: Uuid,
        code: &PermissionCode,
    ) -> Option<PermissionDecision> {
        self.lookup(&Self::permission_key(user_id, code)).await
    }

    pub async fn store_permission(
        &self,
        user_id: Uuid,
        code: &PermissionCode,
        decision: &PermissionDecision,
    ) {
        self.store(&Self::permission_key(user_id, code), decision, PERMISSION_TTL)
            .await;
    }

    /// Drop everything cached for a user: the identity snapshot and every
    /// permission decision. The invalidator cannot know which decisions were
    /// cached, so it walks the full closed permission set.
    pub async fn invalidate_user(&self, user_id: Uuid) {
        self.inner.delete(&Self::user_key(user_id)).await;
        for code in self.registry.all_permission_codes() {
            self.inner.delete(&Self::permission_key(user_id, code)).await;
        }
    }

    /// Absent and malformed entries both collapse into `None`; corruption is
    /// a cache miss, not an error.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.inner.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(key, error = %err, "discarding malformed cache entry");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.inner.set(key, raw, ttl).await,
            Err(err) => tracing::debug!(key, error = %err, "failed to encode cache entry"),
        }
    }
}
