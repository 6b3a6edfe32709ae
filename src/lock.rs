//! Keyed mutual-exclusion port.
//!
//! Refresh-token rotation is the only path that needs explicit locking;
//! rotations for the same `(user, fingerprint)` key execute one at a time
//! while different keys proceed concurrently. Guards release on drop, so a
//! cancelled request can never leak a held lock.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Blocks until the key's lock is held. No acquisition timeout here;
    /// bounded waits are the concern of a networked lock implementation.
    async fn acquire(&self, key: &str) -> LockGuard;
}

pub struct LockGuard {
    _guard: OwnedMutexGuard<()>,
}

/// In-process lock adapter: one mutex per key, created on first use.
#[derive(Default)]
pub struct MemoryLock {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn acquire(&self, key: &str) -> LockGuard {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        LockGuard {
            _guard: entry.lock_owned().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn same_key_is_serialized() {
        let lock = Arc::new(MemoryLock::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = lock.clone();
            let in_section = in_section.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = lock.acquire("auth:refresh:u:fp").await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let lock = MemoryLock::new();
        let _a = lock.acquire("a").await;
        // would deadlock if keys shared a mutex
        let _b = lock.acquire("b").await;
    }

    #[tokio::test]
    async fn guard_releases_on_drop() {
        let lock = MemoryLock::new();
        {
            let _guard = lock.acquire("k").await;
        }
        let _again = lock.acquire("k").await;
    }
}
