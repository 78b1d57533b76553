use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::metrics::track_cache_operation;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Proof that the holder owns the generation/review slot of one material.
pub struct MaterialLockGuard {
    material_id: String,
    inner: GuardInner,
}

enum GuardInner {
    Local(OwnedMutexGuard<()>),
    /// `None` once released.
    Redis(Option<RedisHold>),
}

struct RedisHold {
    redis: ConnectionManager,
    key: String,
    token: String,
}

impl RedisHold {
    async fn release(self, material_id: &str) {
        let mut conn = self.redis;
        let released = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async::<i32>(&mut conn)
            .await;

        match released {
            Ok(1) => tracing::debug!(material_id = %material_id, "Released material lock"),
            Ok(_) => tracing::warn!(
                material_id = %material_id,
                "Material lock expired before release"
            ),
            Err(e) => tracing::warn!(
                material_id = %material_id,
                error = %e,
                "Failed to release material lock"
            ),
        }
    }
}

impl MaterialLockGuard {
    pub fn material_id(&self) -> &str {
        &self.material_id
    }
}

// A cancelled request drops its guard without reaching `release`.
impl Drop for MaterialLockGuard {
    fn drop(&mut self) {
        let GuardInner::Redis(hold) = &mut self.inner else {
            return;
        };
        let Some(hold) = hold.take() else {
            return;
        };

        let material_id = self.material_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(material_id = %material_id, "Releasing dropped material lock");
                handle.spawn(async move { hold.release(&material_id).await });
            }
            Err(_) => tracing::warn!(
                material_id = %material_id,
                "No runtime to release dropped material lock; it expires after its ttl"
            ),
        }
    }
}

/// At most one generation or review write per material at a time.
#[async_trait]
pub trait MaterialLocks: Send + Sync {
    async fn acquire(&self, material_id: &str) -> Result<MaterialLockGuard>;

    async fn release(&self, guard: MaterialLockGuard);
}

/// In-process locks for single-instance deployments and tests.
#[derive(Default)]
pub struct LocalMaterialLocks {
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LocalMaterialLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, material_id: &str) -> Result<Arc<AsyncMutex<()>>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("material lock table poisoned"))?;
        Ok(slots
            .entry(material_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone())
    }
}

#[async_trait]
impl MaterialLocks for LocalMaterialLocks {
    async fn acquire(&self, material_id: &str) -> Result<MaterialLockGuard> {
        let slot = self.slot(material_id)?;
        let guard = slot.lock_owned().await;
        Ok(MaterialLockGuard {
            material_id: material_id.to_string(),
            inner: GuardInner::Local(guard),
        })
    }

    async fn release(&self, guard: MaterialLockGuard) {
        let material_id = guard.material_id.clone();
        drop(guard);

        // Forget idle slots so the table does not grow with every material ever seen.
        if let Ok(mut slots) = self.slots.lock() {
            if let Some(slot) = slots.get(&material_id) {
                if Arc::strong_count(slot) == 1 {
                    slots.remove(&material_id);
                }
            }
        }
    }
}

/// Cross-instance locks: `SET NX PX` with a random token, released only by
/// the token holder. An abandoned lock expires after `ttl_ms`.
pub struct RedisMaterialLocks {
    redis: ConnectionManager,
    ttl_ms: u64,
    retry: RetryConfig,
}

impl RedisMaterialLocks {
    pub fn new(redis: ConnectionManager, ttl_ms: u64) -> Self {
        Self {
            redis,
            ttl_ms,
            retry: RetryConfig::lock_acquisition(),
        }
    }

    fn key(material_id: &str) -> String {
        format!("studypack:lock:material:{}", material_id)
    }
}

#[async_trait]
impl MaterialLocks for RedisMaterialLocks {
    async fn acquire(&self, material_id: &str) -> Result<MaterialLockGuard> {
        let key = Self::key(material_id);
        let token = Uuid::new_v4().to_string();

        retry_async_with_config(self.retry.clone(), || {
            let mut conn = self.redis.clone();
            let key = key.clone();
            let token = token.clone();
            async move {
                let acquired = track_cache_operation("lock_acquire", async {
                    redis::cmd("SET")
                        .arg(&key)
                        .arg(&token)
                        .arg("NX")
                        .arg("PX")
                        .arg(self.ttl_ms)
                        .query_async::<Option<String>>(&mut conn)
                        .await
                        .context("Failed to acquire material lock")
                })
                .await?;

                match acquired {
                    Some(_) => Ok(()),
                    None => Err(anyhow!("material {} is locked", key)),
                }
            }
        })
        .await?;

        tracing::debug!(material_id = %material_id, "Acquired material lock");
        Ok(MaterialLockGuard {
            material_id: material_id.to_string(),
            inner: GuardInner::Redis(Some(RedisHold {
                redis: self.redis.clone(),
                key,
                token,
            })),
        })
    }

    async fn release(&self, mut guard: MaterialLockGuard) {
        let GuardInner::Redis(hold) = &mut guard.inner else {
            return;
        };
        if let Some(hold) = hold.take() {
            hold.release(&guard.material_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn local_lock_serializes_same_material() {
        let locks = Arc::new(LocalMaterialLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let guard = locks.acquire("material-1").await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                locks.release(guard).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn local_lock_does_not_block_other_materials() {
        let locks = LocalMaterialLocks::new();
        let first = locks.acquire("material-1").await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire("material-2"))
            .await
            .expect("other material must not wait")
            .unwrap();

        assert_eq!(second.material_id(), "material-2");
        locks.release(first).await;
        locks.release(second).await;
    }

    #[tokio::test]
    async fn released_slots_are_forgotten() {
        let locks = LocalMaterialLocks::new();
        let guard = locks.acquire("material-1").await.unwrap();
        locks.release(guard).await;

        assert!(locks.slots.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_local_guard_frees_the_material() {
        let locks = LocalMaterialLocks::new();
        let guard = locks.acquire("material-1").await.unwrap();
        drop(guard);

        let again = tokio::time::timeout(Duration::from_millis(100), locks.acquire("material-1"))
            .await
            .expect("dropped guard must not keep the slot")
            .unwrap();
        locks.release(again).await;
    }

    #[tokio::test]
    #[ignore] // Requires Redis at REDIS_URI
    async fn dropped_redis_guard_releases_its_key() {
        let redis_uri =
            std::env::var("REDIS_URI").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());
        let conn = redis::Client::open(redis_uri)
            .unwrap()
            .get_connection_manager()
            .await
            .unwrap();
        let locks = RedisMaterialLocks::new(conn.clone(), 60_000);
        let material_id = Uuid::new_v4().to_string();

        let guard = locks.acquire(&material_id).await.unwrap();
        drop(guard);

        // Without the drop release this would wait for the 60 s ttl.
        let again = tokio::time::timeout(Duration::from_secs(5), locks.acquire(&material_id))
            .await
            .expect("dropped guard must release its key")
            .unwrap();
        locks.release(again).await;

        let mut conn = conn;
        let exists: bool = redis::cmd("EXISTS")
            .arg(RedisMaterialLocks::key(&material_id))
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(!exists);
    }
}
