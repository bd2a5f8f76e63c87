//! Redis-backed key-value store.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Pool, PoolConfig, Runtime};
use redis::AsyncCommands;

use super::{KeyValueStore, RedisConfig, WindowCount};
use crate::error::{CacheError, CacheResult};

/// Compare-and-delete used to release a lock only while it is still ours.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Fixed-window counter: INCR, arm the expiry on first touch, report the TTL.
const INCR_WINDOW_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
"#;

/// Key-value store over a `deadpool-redis` connection pool.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Wraps an existing pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool from `config` and verifies a connection can be checked out.
    pub async fn connect(config: &RedisConfig) -> CacheResult<Self> {
        let timeout = Duration::from_millis(config.timeout_ms);

        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::key_value(format!("pool: {e}")))?;

        // Fail fast so the caller can fall back.
        drop(pool.get().await?);

        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn conn(&self) -> CacheResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.get::<_, Option<String>>(key).await?)
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        let values = redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<String>>>(&mut conn)
            .await?;
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => conn.pset_ex::<_, _, ()>(key, value, millis(ttl)).await?,
            None => conn.set::<_, _, ()>(key, value).await?,
        }
        tracing::trace!(key = %key, "redis SET");
        Ok(())
    }

    async fn set_many(
        &self,
        entries: &[(String, String)],
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        let mset = pipe.cmd("MSET");
        for (key, value) in entries {
            mset.arg(key).arg(value);
        }
        mset.ignore();
        if let Some(ttl) = ttl {
            let ms = millis(ttl);
            for (key, _) in entries {
                pipe.cmd("PEXPIRE").arg(key).arg(ms).ignore();
            }
        }

        let mut conn = self.conn().await?;
        pipe.query_async::<()>(&mut conn).await?;
        tracing::trace!(count = entries.len(), "redis MSET");
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        Ok(conn.del::<_, u64>(keys).await?)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.keys::<_, Vec<String>>(pattern).await?)
    }

    async fn set_if_absent(&self, key: &str, value: &str, lease: Duration) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(lease))
            .query_async::<Option<String>>(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> CacheResult<bool> {
        let mut conn = self.conn().await?;
        let deleted = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(value)
            .invoke_async::<i64>(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn incr_window(&self, key: &str, window: Duration) -> CacheResult<WindowCount> {
        let mut conn = self.conn().await?;
        let (count, ttl_ms) = redis::Script::new(INCR_WINDOW_SCRIPT)
            .key(key)
            .arg(millis(window))
            .invoke_async::<(u64, i64)>(&mut conn)
            .await?;
        Ok(WindowCount {
            count,
            reset_in: Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0)),
        })
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
