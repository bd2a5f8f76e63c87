//! Lease-based distributed lock over the shared key-value store.
//!
//! A lock is a key set with `NX` and a millisecond lease. The value is a
//! random token so a holder whose lease already expired can never release a
//! lock someone else has since taken. A crashed holder blocks the resource for
//! at most one lease.

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CacheError, CacheResult};
use crate::kv::DynKeyValueStore;

/// Lock timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease length in milliseconds.
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,

    /// Acquisition attempts after the first one.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Pause between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound of the random extra pause per attempt, in milliseconds.
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
}

fn default_lease_ms() -> u64 {
    1000
}

fn default_retry_count() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_retry_jitter_ms() -> u64 {
    50
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: default_lease_ms(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
        }
    }
}

impl LockConfig {
    /// Default lease.
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    fn retry_pause(&self) -> Duration {
        let jitter = if self.retry_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.retry_jitter_ms)
        };
        Duration::from_millis(self.retry_delay_ms + jitter)
    }
}

/// A held lock. Hand it back to [`DistributedLock::release`].
#[derive(Debug)]
pub struct LockGuard {
    resource: String,
    token: String,
    acquired_at: Instant,
    lease: Duration,
}

impl LockGuard {
    /// The locked resource key.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Returns `true` once the lease has run out.
    pub fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() >= self.lease
    }
}

/// Cross-process mutual exclusion keyed by resource name.
#[derive(Clone)]
pub struct DistributedLock {
    store: DynKeyValueStore,
    config: LockConfig,
}

impl DistributedLock {
    /// Creates a lock client over `store`.
    pub fn new(store: DynKeyValueStore, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// The timing settings.
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquires `resource` for `lease`, retrying up to the configured bound.
    ///
    /// # Errors
    ///
    /// `CacheError::LockTimeout` once every attempt has failed; store errors
    /// are returned as-is.
    pub async fn acquire(&self, resource: &str, lease: Duration) -> CacheResult<LockGuard> {
        let token = Uuid::new_v4().to_string();

        for attempt in 0..=self.config.retry_count {
            if self.store.set_if_absent(resource, &token, lease).await? {
                tracing::trace!(resource = %resource, attempt, "lock acquired");
                return Ok(LockGuard {
                    resource: resource.to_string(),
                    token,
                    acquired_at: Instant::now(),
                    lease,
                });
            }
            if attempt < self.config.retry_count {
                tokio::time::sleep(self.config.retry_pause()).await;
            }
        }

        tracing::warn!(
            resource = %resource,
            attempts = self.config.retry_count + 1,
            "lock acquisition timed out"
        );
        Err(CacheError::lock_timeout(resource))
    }

    /// Releases a held lock. Returns `false` if the lease had already lapsed
    /// and the key was gone or taken by someone else.
    pub async fn release(&self, guard: LockGuard) -> CacheResult<bool> {
        let released = self
            .store
            .delete_if_equals(&guard.resource, &guard.token)
            .await?;
        if !released {
            tracing::warn!(
                resource = %guard.resource,
                held_ms = guard.acquired_at.elapsed().as_millis() as u64,
                "lock lease lapsed before release"
            );
        }
        Ok(released)
    }

    /// Runs `critical` while holding `resource`.
    ///
    /// The lock is released on every exit path of `critical`. A failed
    /// release is logged and otherwise ignored: the lease expires on its own.
    pub async fn with_lock<T, F, Fut>(
        &self,
        resource: &str,
        lease: Duration,
        critical: F,
    ) -> CacheResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<T>>,
    {
        let guard = self.acquire(resource, lease).await?;
        let result = critical().await;

        if let Err(e) = self.release(guard).await {
            tracing::warn!(resource = %resource, error = %e, "lock release failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use std::sync::Arc;

    fn fast_lock(retry_count: u32) -> DistributedLock {
        DistributedLock::new(
            Arc::new(MemoryStore::new()),
            LockConfig {
                lease_ms: 200,
                retry_count,
                retry_delay_ms: 10,
                retry_jitter_ms: 5,
            },
        )
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_success_and_error() {
        let lock = fast_lock(0);
        let lease = lock.config().lease();

        let value = lock.with_lock("r", lease, || async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let failed: CacheResult<()> = lock
            .with_lock("r", lease, || async { Err(CacheError::key_value("boom")) })
            .await;
        assert!(failed.is_err());

        // Both paths released the key, so a zero-retry acquire succeeds.
        let guard = lock.acquire("r", lease).await.unwrap();
        assert!(lock.release(guard).await.unwrap());
    }

    #[tokio::test]
    async fn test_contended_lock_times_out() {
        let lock = fast_lock(2);
        let held = lock.acquire("r", Duration::from_secs(5)).await.unwrap();

        let err = lock.acquire("r", lock.config().lease()).await.unwrap_err();
        assert!(err.is_lock_timeout());

        lock.release(held).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_lease_is_not_released_by_old_holder() {
        let lock = fast_lock(0);
        let stale = lock.acquire("r", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(stale.is_expired());

        let fresh = lock.acquire("r", Duration::from_secs(5)).await.unwrap();
        assert!(!lock.release(stale).await.unwrap());
        assert!(lock.release(fresh).await.unwrap());
    }
}
