//! Server-side refresh-token records with replay detection.
//!
//! One token is valid per `(user, device fingerprint)` pair at any moment.
//! Rotation swaps the record under a keyed lock; a presented token that no
//! longer matches the record means the token was already spent, so the whole
//! session record is destroyed rather than silently accepted.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::KeyValueCache;
use crate::errors::AppError;
use crate::lock::DistributedLock;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The presented token does not match the stored record. Security
    /// relevant: somebody replayed an already-rotated token.
    #[error("refresh token replay detected")]
    Replay,
    /// No record exists where one was expected (logged out, expired, or
    /// invalidated after a replay).
    #[error("refresh token is no longer valid")]
    Invalid,
}

impl From<RefreshError> for AppError {
    fn from(err: RefreshError) -> Self {
        // Both outcomes look identical to the client; only the logs
        // distinguish replay from ordinary staleness.
        match err {
            RefreshError::Replay | RefreshError::Invalid => {
                AppError::unauthenticated("Invalid refresh token")
            }
        }
    }
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    cache: Arc<dyn KeyValueCache>,
    lock: Arc<dyn DistributedLock>,
    ttl: Duration,
}

impl RefreshTokenStore {
    pub fn new(
        cache: Arc<dyn KeyValueCache>,
        lock: Arc<dyn DistributedLock>,
        ttl: Duration,
    ) -> Self {
        Self { cache, lock, ttl }
    }

    fn key(user_id: Uuid, fingerprint: &str) -> String {
        format!("auth:refresh:{user_id}:{fingerprint}")
    }

    /// Replace the stored token for this device with `new`, provided `old`
    /// matches the current record. The very first rotation passes `old=""`
    /// to mean "no prior token expected". Serialized per key by the lock;
    /// the guard drops on every exit path.
    pub async fn rotate(
        &self,
        user_id: Uuid,
        fingerprint: &str,
        old: &str,
        new: &str,
    ) -> Result<(), RefreshError> {
        let key = Self::key(user_id, fingerprint);
        let _guard = self.lock.acquire(&key).await;

        match self.cache.get(&key).await {
            Some(current) if current != old => {
                // Mismatch means `old` was already spent. Invalidate the
                // session outright instead of letting either copy live on.
                self.cache.delete(&key).await;
                tracing::warn!(user_id = %user_id, fingerprint, "refresh token replay detected");
                Err(RefreshError::Replay)
            }
            // Empty `old` starts a chain; anything else needs a live record.
            None if !old.is_empty() => Err(RefreshError::Invalid),
            _ => {
                self.cache.set(&key, new.to_string(), self.ttl).await;
                Ok(())
            }
        }
    }

    /// Logout: drop the record unconditionally.
    pub async fn revoke(&self, user_id: Uuid, fingerprint: &str) {
        self.cache.delete(&Self::key(user_id, fingerprint)).await;
    }

    pub async fn current(&self, user_id: Uuid, fingerprint: &str) -> Option<String> {
        self.cache.get(&Self::key(user_id, fingerprint)).await
    }
}
