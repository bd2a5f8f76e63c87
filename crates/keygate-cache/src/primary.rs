//! Primary-key cache-aside layer.
//!
//! ## Lookup
//!
//! 1. Probe the record cache (no lock).
//! 2. On miss, take the distributed lock on `lock:<entityType>:<id>`.
//! 3. Probe again: a concurrent holder may have filled it meanwhile.
//! 4. Read the entity store, write the record, release the lock.
//!
//! Store misses are not cached. Batch reads skip the lock entirely and accept
//! redundant fills.
//!
//! ## Coherence
//!
//! Lifecycle hooks write or evict under the same per-id lock as the fill, so
//! a fill that read a row before a mutation cannot land after the mutation's
//! hook. Destroys evict twice: before the delete and again once the row is
//! gone, which discards a fill that ran between the two.
//!
//! ## Records
//!
//! The cached record is the entity's attribute map (optionally restricted to a
//! configured selection) without `id`, since the id is part of the key. A
//! record that no longer decodes into the entity is treated as a miss and
//! overwritten by the next fill.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use keygate_storage::{
    Attributes, DynEntityStore, Entity, HookContext, HookRegistry, LifecycleEvent, LifecycleHook,
    StorageResult, project,
};
use serde_json::Value;

use crate::error::CacheResult;
use crate::lock::DistributedLock;
use crate::metrics;
use crate::record::{DynRecordCache, cache_key};

/// Name the cache registers its lifecycle hooks under.
pub const HOOK_NAME: &str = "primary_cache";

const HOOK_EVENTS: [LifecycleEvent; 4] = [
    LifecycleEvent::AfterCreate,
    LifecycleEvent::AfterUpdate,
    LifecycleEvent::BeforeDestroy,
    LifecycleEvent::AfterDestroy,
];

/// Cache-aside access to one entity type by primary id.
pub struct PrimaryCache<E: Entity> {
    store: DynEntityStore<E>,
    cache: DynRecordCache,
    lock: DistributedLock,
    lease: Duration,
    select: Vec<String>,
}

impl<E: Entity> PrimaryCache<E> {
    /// Creates a cache over `store`, using the lock's configured lease.
    pub fn new(store: DynEntityStore<E>, cache: DynRecordCache, lock: DistributedLock) -> Self {
        let lease = lock.config().lease();
        Self {
            store,
            cache,
            lock,
            lease,
            select: Vec::new(),
        }
    }

    /// Restricts cached records and fill reads to these attributes (plus `id`).
    ///
    /// The entity must deserialize with the remaining attributes absent.
    #[must_use]
    pub fn with_select<I, S>(mut self, select: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = select.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the fill lock lease.
    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// The entity store behind the cache.
    pub fn store(&self) -> &DynEntityStore<E> {
        &self.store
    }

    /// Cache key for `id`.
    pub fn key(&self, id: &str) -> String {
        cache_key(E::ENTITY_TYPE, id)
    }

    /// Registers the coherence hooks on `hooks`.
    pub fn attach(self: &Arc<Self>, hooks: &HookRegistry<E>) {
        let hook: Arc<dyn LifecycleHook<E>> = self.clone();
        for event in HOOK_EVENTS {
            hooks.register(event, HOOK_NAME, hook.clone());
        }
    }

    /// Removes the coherence hooks from `hooks`.
    pub fn detach(&self, hooks: &HookRegistry<E>) {
        for event in HOOK_EVENTS {
            hooks.unregister(event, HOOK_NAME);
        }
    }

    /// Fetches an entity by id, filling the cache on miss.
    ///
    /// # Errors
    ///
    /// Entity store and key-value store failures, and
    /// `CacheError::LockTimeout` if the fill lock stays contended.
    pub async fn get(&self, id: &str) -> CacheResult<Option<E>> {
        let key = self.key(id);
        if let Some(hit) = self.probe(&key, id).await? {
            tracing::debug!(key = %key, "cache hit");
            metrics::record_cache_hit(E::ENTITY_TYPE, 1);
            return Ok(Some(hit));
        }
        metrics::record_cache_miss(E::ENTITY_TYPE, 1);

        let key = &key;
        self.lock
            .with_lock(&Self::lock_resource(key), self.lease, move || async move {
                if let Some(hit) = self.probe(key, id).await? {
                    tracing::debug!(key = %key, "cache filled while waiting for lock");
                    return Ok(Some(hit));
                }

                let Some(entity) = self.store.find_by_id(id, &self.select).await? else {
                    tracing::debug!(key = %key, "cache miss, not in store");
                    return Ok(None);
                };

                self.cache.put(key, self.encode(&entity)?).await?;
                metrics::record_cache_fill(E::ENTITY_TYPE, 1);
                tracing::debug!(key = %key, "cache filled");
                Ok(Some(entity))
            })
            .await
    }

    /// Fetches many entities, aligned with `ids`.
    ///
    /// Uncached ids are read from the store in one query and written back as
    /// a batch. Ids that are neither cached nor stored yield `None`.
    pub async fn get_batch(&self, ids: &[String]) -> CacheResult<Vec<Option<E>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.key(id)).collect();
        let cached = self.cache.get_many(&keys).await?;
        let mut results: Vec<Option<E>> = ids
            .iter()
            .zip(&keys)
            .zip(cached)
            .map(|((id, key), record)| record.and_then(|r| self.decode(key, id, r)))
            .collect();

        let mut seen = HashSet::new();
        let missing: Vec<String> = ids
            .iter()
            .zip(&results)
            .filter(|&(id, hit)| hit.is_none() && seen.insert(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();

        let hits = results.iter().filter(|r| r.is_some()).count() as u64;
        metrics::record_cache_hit(E::ENTITY_TYPE, hits);
        if missing.is_empty() {
            return Ok(results);
        }
        metrics::record_cache_miss(E::ENTITY_TYPE, missing.len() as u64);

        let fetched = self.store.find_by_ids(&missing, &self.select).await?;
        if !fetched.is_empty() {
            let records = fetched
                .iter()
                .map(|entity| Ok((self.key(&entity.id()), self.encode(entity)?)))
                .collect::<CacheResult<Vec<_>>>()?;
            self.cache.put_many(records).await?;
            metrics::record_cache_fill(E::ENTITY_TYPE, fetched.len() as u64);
        }
        tracing::debug!(
            entity = E::ENTITY_TYPE,
            requested = ids.len(),
            missing = missing.len(),
            fetched = fetched.len(),
            "batch cache fill"
        );

        let by_id: HashMap<String, E> = fetched.into_iter().map(|e| (e.id(), e)).collect();
        for (id, slot) in ids.iter().zip(results.iter_mut()) {
            if slot.is_none() {
                *slot = by_id.get(id).cloned();
            }
        }
        Ok(results)
    }

    /// Writes an entity's current state into the cache.
    pub async fn put(&self, entity: &E) -> CacheResult<()> {
        let key = self.key(&entity.id());
        self.cache.put(&key, self.encode(entity)?).await?;
        tracing::debug!(key = %key, "cache put");
        Ok(())
    }

    /// Writes several entities into the cache.
    pub async fn put_batch(&self, entities: &[E]) -> CacheResult<()> {
        let records = entities
            .iter()
            .map(|entity| Ok((self.key(&entity.id()), self.encode(entity)?)))
            .collect::<CacheResult<Vec<_>>>()?;
        self.cache.put_many(records).await
    }

    /// Evicts one id.
    pub async fn remove(&self, id: &str) -> CacheResult<()> {
        let key = self.key(id);
        self.cache.remove(&key).await?;
        tracing::debug!(key = %key, "cache evicted");
        Ok(())
    }

    /// Evicts several ids.
    pub async fn remove_batch(&self, ids: &[String]) -> CacheResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.key(id)).collect();
        self.cache.remove_many(&keys).await?;
        tracing::debug!(entity = E::ENTITY_TYPE, count = keys.len(), "cache evicted batch");
        Ok(())
    }

    /// Evicts every cached record of this entity type.
    pub async fn clear(&self) -> CacheResult<()> {
        self.cache.clear(E::ENTITY_TYPE).await
    }

    fn lock_resource(key: &str) -> String {
        format!("lock:{key}")
    }

    async fn probe(&self, key: &str, id: &str) -> CacheResult<Option<E>> {
        Ok(self
            .cache
            .get(key)
            .await?
            .and_then(|record| self.decode(key, id, record)))
    }

    fn encode(&self, entity: &E) -> CacheResult<Attributes> {
        let mut record = project(entity.to_attributes()?, &self.select);
        record.remove("id");
        Ok(record)
    }

    fn decode(&self, key: &str, id: &str, mut record: Attributes) -> Option<E> {
        record.insert("id".to_string(), Value::String(id.to_string()));
        match E::from_attributes(record) {
            Ok(entity) => Some(entity),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cached record does not decode, treating as miss");
                None
            }
        }
    }
}

#[async_trait]
impl<E: Entity> LifecycleHook<E> for PrimaryCache<E> {
    async fn handle(&self, ctx: &HookContext<'_, E>) -> StorageResult<()> {
        let resource = Self::lock_resource(&self.key(&ctx.entity().id()));
        let result = match ctx {
            HookContext::Created(entity) | HookContext::Updated { current: entity, .. } => {
                self.lock
                    .with_lock(&resource, self.lease, || self.put(entity))
                    .await
            }
            HookContext::Destroying(entity) | HookContext::Destroyed(entity) => {
                let id = entity.id();
                self.lock
                    .with_lock(&resource, self.lease, || self.remove(&id))
                    .await
            }
            HookContext::Updating { .. } => Ok(()),
        };
        result.map_err(|e| e.into_hook_error(HOOK_NAME))
    }
}
