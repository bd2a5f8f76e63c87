//! Shared key-value substrate.
//!
//! The cache, the distributed lock and the rate limiter all speak to a
//! [`KeyValueStore`]. Two implementations exist:
//!
//! - [`RedisStore`]: multi-process, backed by a `deadpool-redis` pool.
//! - [`MemoryStore`]: single-process, `DashMap` with lazy expiry.
//!
//! [`create_kv_store`] picks one from configuration and falls back to the
//! in-process store when Redis is disabled or unreachable.

mod memory;
mod redis_store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CacheResult;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Result of bumping a fixed-window counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Counter value after the increment.
    pub count: u64,
    /// Time until the window expires.
    pub reset_in: Duration,
}

/// Key-value store with the atomic primitives the gateway relies on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `GET key`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `MGET keys`; the result is aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>>;

    /// `SET key value [PX ttl]`.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// `MSET` followed by a per-key `PEXPIRE` when `ttl` is set.
    async fn set_many(&self, entries: &[(String, String)], ttl: Option<Duration>)
    -> CacheResult<()>;

    /// `DEL keys`; returns the number of keys removed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// `KEYS pattern` with Redis glob syntax.
    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>>;

    /// `SET key value NX PX lease`; returns `true` if the key was set.
    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> CacheResult<bool>;

    /// Deletes `key` only if it still holds `value`. Returns `true` if deleted.
    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool>;

    /// Atomically increments a counter, starting a `window`-long expiry on
    /// first touch.
    async fn incr_window(&self, key: &str, window: Duration) -> CacheResult<WindowCount>;

    /// Backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Type alias for a shared key-value store trait object.
pub type DynKeyValueStore = Arc<dyn KeyValueStore>;

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Use Redis as the shared store. When `false`, the in-process store is used.
    #[serde(default)]
    pub enabled: bool,

    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size.
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Pool wait/create/recycle timeout in milliseconds.
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

/// Creates the shared key-value store described by `config`.
///
/// ## Graceful Degradation
///
/// If Redis is disabled, the pool cannot be built, or the first connection
/// fails, the in-process [`MemoryStore`] is returned instead. The process then
/// runs in single-process mode.
pub async fn create_kv_store(config: &RedisConfig) -> DynKeyValueStore {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-process key-value store");
        return Arc::new(MemoryStore::new());
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    match RedisStore::connect(config).await {
        Ok(store) => {
            tracing::info!("Connected to Redis");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process key-value store."
            );
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_redis_falls_back_to_memory() {
        let store = create_kv_store(&RedisConfig::default()).await;
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_unreachable_redis_falls_back_to_memory() {
        let config = RedisConfig {
            enabled: true,
            url: "redis://127.0.0.1:1".to_string(),
            pool_size: 1,
            timeout_ms: 200,
        };
        let store = create_kv_store(&config).await;
        assert_eq!(store.backend_name(), "memory");
    }
}
