//! Mutual exclusion across workers.
//!
//! [`DistributedLock`] is a Redis `SET NX PX` lock with a random owner token,
//! released through a compare-and-delete script so a worker never frees a lock
//! that expired and was taken by someone else. [`LockManager`] picks between it
//! and a process local lock table depending on the configured storage.
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use redis::aio::ConnectionManager;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::constants::LOCK_POLL_INTERVAL_MS;
use crate::models::RepositoryError;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// A Redis backed lock on a single key.
#[derive(Clone)]
pub struct DistributedLock {
    conn: Arc<ConnectionManager>,
    key: String,
    ttl: Duration,
}

impl DistributedLock {
    pub fn new(conn: Arc<ConnectionManager>, key: &str, ttl: Duration) -> Self {
        Self {
            conn,
            key: key.to_string(),
            ttl,
        }
    }

    /// Takes the lock if nobody holds it.
    ///
    /// Returns `Ok(None)` when another owner holds the lock.
    pub async fn try_acquire(&self) -> Result<Option<DistributedLockGuard>, RepositoryError> {
        let token = uuid::Uuid::new_v4().to_string();
        let mut conn = self.conn.as_ref().clone();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| RepositoryError::ConnectionError(format!("lock {}: {e}", self.key)))?;

        Ok(acquired.map(|_| DistributedLockGuard {
            conn: self.conn.clone(),
            key: self.key.clone(),
            token,
            released: false,
        }))
    }

    /// Polls until the lock is free or `wait` elapses.
    pub async fn acquire_with_timeout(
        &self,
        wait: Duration,
    ) -> Result<Option<DistributedLockGuard>, RepositoryError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(guard) = self.try_acquire().await? {
                return Ok(Some(guard));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(LOCK_POLL_INTERVAL_MS)).await;
        }
    }
}

/// Ownership of a [`DistributedLock`]. Releasing happens on drop when
/// [`DistributedLockGuard::release`] was not awaited.
pub struct DistributedLockGuard {
    conn: Arc<ConnectionManager>,
    key: String,
    token: String,
    released: bool,
}

impl DistributedLockGuard {
    pub async fn release(mut self) -> Result<(), RepositoryError> {
        self.released = true;
        release_lock(self.conn.clone(), &self.key, &self.token).await
    }
}

impl Drop for DistributedLockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let conn = self.conn.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = release_lock(conn, &key, &token).await {
                        warn!(error = %e, lock_key = %key, "failed to release distributed lock");
                    }
                });
            }
            Err(_) => {
                warn!(lock_key = %key, "no runtime to release lock, it will expire by ttl");
            }
        }
    }
}

async fn release_lock(
    conn: Arc<ConnectionManager>,
    key: &str,
    token: &str,
) -> Result<(), RepositoryError> {
    let mut conn = conn.as_ref().clone();
    let deleted: i32 = redis::Script::new(RELEASE_SCRIPT)
        .key(key)
        .arg(token)
        .invoke_async(&mut conn)
        .await
        .map_err(|e| RepositoryError::ConnectionError(format!("unlock {key}: {e}")))?;
    if deleted == 0 {
        debug!(lock_key = %key, "lock already expired or taken over");
    }
    Ok(())
}

/// A held lock from either backend.
pub enum LockGuard {
    Local(OwnedMutexGuard<()>),
    Distributed(DistributedLockGuard),
}

impl LockGuard {
    pub async fn release(self) {
        match self {
            LockGuard::Local(guard) => drop(guard),
            LockGuard::Distributed(guard) => {
                if let Err(e) = guard.release().await {
                    warn!(error = %e, "failed to release distributed lock");
                }
            }
        }
    }
}

/// Named locks, in process or in Redis.
#[derive(Clone)]
pub enum LockManager {
    InMemory(Arc<DashMap<String, Arc<Mutex<()>>>>),
    Redis {
        conn: Arc<ConnectionManager>,
        key_prefix: String,
    },
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockManager::InMemory(locks) => f
                .debug_struct("LockManager::InMemory")
                .field("locks", &locks.len())
                .finish(),
            LockManager::Redis { key_prefix, .. } => f
                .debug_struct("LockManager::Redis")
                .field("key_prefix", key_prefix)
                .finish(),
        }
    }
}

impl LockManager {
    pub fn new_in_memory() -> Self {
        LockManager::InMemory(Arc::new(DashMap::new()))
    }

    pub fn new_redis(conn: Arc<ConnectionManager>, key_prefix: String) -> Self {
        LockManager::Redis { conn, key_prefix }
    }

    fn local_mutex(locks: &DashMap<String, Arc<Mutex<()>>>, name: &str) -> Arc<Mutex<()>> {
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn redis_lock(conn: &Arc<ConnectionManager>, key_prefix: &str, name: &str, ttl: Duration) -> DistributedLock {
        DistributedLock::new(conn.clone(), &format!("{key_prefix}:{name}"), ttl)
    }

    /// Non-blocking acquisition. `Ok(None)` means the lock is held elsewhere.
    pub async fn try_lock(
        &self,
        name: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, RepositoryError> {
        match self {
            LockManager::InMemory(locks) => Ok(Self::local_mutex(locks, name)
                .try_lock_owned()
                .ok()
                .map(LockGuard::Local)),
            LockManager::Redis { conn, key_prefix } => Ok(Self::redis_lock(conn, key_prefix, name, ttl)
                .try_acquire()
                .await?
                .map(LockGuard::Distributed)),
        }
    }

    /// Blocking acquisition bounded by `wait`. `Ok(None)` means it timed out.
    pub async fn lock(
        &self,
        name: &str,
        ttl: Duration,
        wait: Duration,
    ) -> Result<Option<LockGuard>, RepositoryError> {
        match self {
            LockManager::InMemory(locks) => {
                let mutex = Self::local_mutex(locks, name);
                Ok(tokio::time::timeout(wait, mutex.lock_owned())
                    .await
                    .ok()
                    .map(LockGuard::Local))
            }
            LockManager::Redis { conn, key_prefix } => Ok(Self::redis_lock(conn, key_prefix, name, ttl)
                .acquire_with_timeout(wait)
                .await?
                .map(LockGuard::Distributed)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_try_lock_is_exclusive() {
        let manager = LockManager::new_in_memory();
        let ttl = Duration::from_secs(5);

        let guard = manager.try_lock("lock:task", ttl).await.unwrap();
        assert!(guard.is_some());
        assert!(manager.try_lock("lock:task", ttl).await.unwrap().is_none());
        assert!(manager.try_lock("lock:other", ttl).await.unwrap().is_some());

        guard.unwrap().release().await;
        assert!(manager.try_lock("lock:task", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_in_memory_lock_times_out() {
        let manager = LockManager::new_in_memory();
        let ttl = Duration::from_secs(5);

        let _held = manager.try_lock("locks:0xabc", ttl).await.unwrap().unwrap();
        let waited = manager
            .lock("locks:0xabc", ttl, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(waited.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_lock_waits_for_release() {
        let manager = LockManager::new_in_memory();
        let ttl = Duration::from_secs(5);

        let held = manager.try_lock("locks:0xabc", ttl).await.unwrap().unwrap();
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .lock("locks:0xabc", ttl, Duration::from_secs(5))
                    .await
                    .unwrap()
                    .is_some()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        held.release().await;
        assert!(waiter.await.unwrap());
    }

    async fn redis_manager() -> LockManager {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(redis_url).expect("Failed to create Redis client");
        let conn = ConnectionManager::new(client)
            .await
            .expect("Failed to create Redis connection manager");
        LockManager::new_redis(Arc::new(conn), format!("test-lock-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    #[ignore = "Requires active Redis instance"]
    async fn test_redis_try_lock_is_exclusive() {
        let manager = redis_manager().await;
        let ttl = Duration::from_secs(5);

        let guard = manager.try_lock("lock:task", ttl).await.unwrap().unwrap();
        assert!(manager.try_lock("lock:task", ttl).await.unwrap().is_none());

        guard.release().await;
        assert!(manager.try_lock("lock:task", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    #[ignore = "Requires active Redis instance"]
    async fn test_redis_lock_expires_by_ttl() {
        let manager = redis_manager().await;

        let guard = manager
            .try_lock("lock:short", Duration::from_millis(100))
            .await
            .unwrap()
            .unwrap();
        std::mem::forget(guard);
        let acquired = manager
            .lock("lock:short", Duration::from_secs(5), Duration::from_secs(2))
            .await
            .unwrap();
        assert!(acquired.is_some());
    }
}
