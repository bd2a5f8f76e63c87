//! Record cache backends.
//!
//! A [`RecordCache`] stores attribute maps under fully-formed cache keys
//! (`<entityType>:<id>`). Key derivation and id handling live in
//! [`crate::PrimaryCache`]; backends only move attribute maps around.
//!
//! | Backend | Scope | TTL | Survives restart |
//! |---------|-------|-----|------------------|
//! | [`LocalCache`] | process | no | no |
//! | [`SharedCache`] | every process on the store | optional | yes |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use keygate_storage::Attributes;
use serde_json::Value;

use crate::error::CacheResult;
use crate::kv::DynKeyValueStore;

/// Key delimiter between entity type and id.
pub const KEY_DELIMITER: char = ':';

/// Formats a cache key for one entity.
pub fn cache_key(entity_type: &str, id: &str) -> String {
    format!("{entity_type}{KEY_DELIMITER}{id}")
}

/// Glob matching every key of an entity type.
pub fn namespace_pattern(entity_type: &str) -> String {
    format!("{entity_type}{KEY_DELIMITER}*")
}

/// Storage for cached attribute maps.
///
/// Every method that reads returns `None` for entries it cannot decode; the
/// caller then treats them as misses.
#[async_trait]
pub trait RecordCache: Send + Sync {
    /// Reads one record.
    async fn get(&self, key: &str) -> CacheResult<Option<Attributes>>;

    /// Reads many records; the result is aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Attributes>>>;

    /// Writes one record.
    async fn put(&self, key: &str, record: Attributes) -> CacheResult<()>;

    /// Writes many records.
    async fn put_many(&self, records: Vec<(String, Attributes)>) -> CacheResult<()>;

    /// Removes one record.
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Removes many records.
    async fn remove_many(&self, keys: &[String]) -> CacheResult<()>;

    /// Removes every record of `entity_type`.
    async fn clear(&self, entity_type: &str) -> CacheResult<()>;

    /// Backend name for logs and stats.
    fn name(&self) -> &'static str;
}

/// Type alias for a shared record cache trait object.
pub type DynRecordCache = Arc<dyn RecordCache>;

/// Process-local record cache.
#[derive(Debug, Default)]
pub struct LocalCache {
    records: DashMap<String, Attributes>,
}

impl LocalCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordCache for LocalCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Attributes>> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Attributes>>> {
        Ok(keys
            .iter()
            .map(|key| self.records.get(key).map(|r| r.value().clone()))
            .collect())
    }

    async fn put(&self, key: &str, record: Attributes) -> CacheResult<()> {
        self.records.insert(key.to_string(), record);
        Ok(())
    }

    async fn put_many(&self, records: Vec<(String, Attributes)>) -> CacheResult<()> {
        for (key, record) in records {
            self.records.insert(key, record);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.records.remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> CacheResult<()> {
        for key in keys {
            self.records.remove(key);
        }
        Ok(())
    }

    async fn clear(&self, entity_type: &str) -> CacheResult<()> {
        let prefix = cache_key(entity_type, "");
        self.records.retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Record cache over the shared key-value store.
///
/// Records are stored as JSON objects. An optional TTL applies uniformly to
/// every write.
#[derive(Clone)]
pub struct SharedCache {
    store: DynKeyValueStore,
    ttl: Option<Duration>,
}

impl SharedCache {
    /// Creates a shared cache. `ttl` of `None` keeps records until evicted.
    pub fn new(store: DynKeyValueStore, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    /// The TTL applied to writes.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn decode(key: &str, raw: &str) -> Option<Attributes> {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(record)) => Some(record),
            Ok(_) => {
                tracing::warn!(key = %key, "cached payload is not an object, treating as miss");
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached payload is corrupt, treating as miss");
                None
            }
        }
    }

    fn encode(record: &Attributes) -> CacheResult<String> {
        Ok(serde_json::to_string(record)?)
    }
}

#[async_trait]
impl RecordCache for SharedCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Attributes>> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|raw| Self::decode(key, &raw)))
    }

    async fn get_many(&self, keys: &[String]) -> CacheResult<Vec<Option<Attributes>>> {
        let raw = self.store.get_many(keys).await?;
        Ok(keys
            .iter()
            .zip(raw)
            .map(|(key, raw)| raw.and_then(|raw| Self::decode(key, &raw)))
            .collect())
    }

    async fn put(&self, key: &str, record: Attributes) -> CacheResult<()> {
        let encoded = Self::encode(&record)?;
        self.store.set(key, &encoded, self.ttl).await
    }

    async fn put_many(&self, records: Vec<(String, Attributes)>) -> CacheResult<()> {
        let encoded = records
            .iter()
            .map(|(key, record)| Ok((key.clone(), Self::encode(record)?)))
            .collect::<CacheResult<Vec<_>>>()?;
        self.store.set_many(&encoded, self.ttl).await
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.store.delete(&[key.to_string()]).await.map(|_| ())
    }

    async fn remove_many(&self, keys: &[String]) -> CacheResult<()> {
        self.store.delete(keys).await.map(|_| ())
    }

    async fn clear(&self, entity_type: &str) -> CacheResult<()> {
        let keys = self.store.keys(&namespace_pattern(entity_type)).await?;
        let removed = self.store.delete(&keys).await?;
        tracing::debug!(entity = %entity_type, removed, "cache namespace cleared");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "shared"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KeyValueStore, MemoryStore};
    use serde_json::json;

    fn record(name: &str) -> Attributes {
        match json!({ "name": name }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_key_format() {
        assert_eq!(cache_key("tokens", "abc"), "tokens:abc");
        assert_eq!(namespace_pattern("tokens"), "tokens:*");
    }

    #[tokio::test]
    async fn test_local_clear_is_namespaced() {
        let cache = LocalCache::new();
        cache.put("tokens:1", record("a")).await.unwrap();
        cache.put("applications:1", record("b")).await.unwrap();

        cache.clear("tokens").await.unwrap();
        assert!(cache.get("tokens:1").await.unwrap().is_none());
        assert!(cache.get("applications:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shared_corrupt_payload_reads_as_miss() {
        let store = Arc::new(MemoryStore::new());
        store.set("tokens:1", "{not json", None).await.unwrap();
        store.set("tokens:2", "[1,2]", None).await.unwrap();

        let cache = SharedCache::new(store, None);
        assert!(cache.get("tokens:1").await.unwrap().is_none());

        let batch = cache
            .get_many(&["tokens:1".into(), "tokens:2".into()])
            .await
            .unwrap();
        assert_eq!(batch, vec![None, None]);
    }

    #[tokio::test]
    async fn test_shared_ttl_applies_to_writes() {
        let store = Arc::new(MemoryStore::new());
        let cache = SharedCache::new(store, Some(Duration::from_millis(40)));

        cache
            .put_many(vec![("tokens:1".into(), record("a"))])
            .await
            .unwrap();
        assert!(cache.get("tokens:1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(cache.get("tokens:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shared_clear_uses_namespace() {
        let store = Arc::new(MemoryStore::new());
        let cache = SharedCache::new(store.clone(), None);
        cache.put("tokens:1", record("a")).await.unwrap();
        cache.put("tokens:2", record("b")).await.unwrap();
        cache.put("applications:1", record("c")).await.unwrap();

        cache.clear("tokens").await.unwrap();
        assert_eq!(store.keys("*").await.unwrap(), vec!["applications:1"]);
    }
}
