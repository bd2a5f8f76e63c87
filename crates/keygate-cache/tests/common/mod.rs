//! Shared fixtures for cache integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use keygate_cache::{
    DistributedLock, DynKeyValueStore, DynRecordCache, LocalCache, LockConfig, MemoryStore,
    PrimaryCache, SharedCache,
};
use keygate_storage::{
    Entity, EntityStore, EventedStore, HookRegistry, MemoryEntityStore, StorageResult,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub slug: String,
}

impl Entity for Project {
    const ENTITY_TYPE: &'static str = "projects";

    fn id(&self) -> String {
        self.id.clone()
    }
}

pub fn project(id: &str, name: &str) -> Project {
    Project {
        id: id.into(),
        name: name.into(),
        slug: format!("slug-{id}"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Deployment {
    pub id: String,
    pub project_id: String,
}

impl Entity for Deployment {
    const ENTITY_TYPE: &'static str = "deployments";

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Entity store decorator that counts reads and delays lookup replies so
/// concurrent callers actually overlap.
///
/// A lookup reads the row first and then waits, so its caller can act on a
/// row that a concurrent writer has already changed.
pub struct CountingStore<E: Entity> {
    inner: MemoryEntityStore<E>,
    pub find_by_id_calls: AtomicUsize,
    pub find_one_by_calls: AtomicUsize,
    pub batch_queries: Mutex<Vec<Vec<String>>>,
    delay_ms: AtomicU64,
}

impl<E: Entity> CountingStore<E> {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MemoryEntityStore::new(),
            find_by_id_calls: AtomicUsize::new(0),
            find_one_by_calls: AtomicUsize::new(0),
            batch_queries: Mutex::new(Vec::new()),
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
        }
    }

    /// Changes the reply delay for lookups started from now on.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn reply_delay(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    pub fn point_reads(&self) -> usize {
        self.find_by_id_calls.load(Ordering::SeqCst)
    }

    pub fn attribute_reads(&self) -> usize {
        self.find_one_by_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for CountingStore<E> {
    async fn find_by_id(&self, id: &str, select: &[String]) -> StorageResult<Option<E>> {
        self.find_by_id_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.inner.find_by_id(id, select).await;
        self.reply_delay().await;
        found
    }

    async fn find_by_ids(&self, ids: &[String], select: &[String]) -> StorageResult<Vec<E>> {
        self.batch_queries.lock().push(ids.to_vec());
        self.inner.find_by_ids(ids, select).await
    }

    async fn find_one_by(&self, attribute: &str, value: &Value) -> StorageResult<Option<E>> {
        self.find_one_by_calls.fetch_add(1, Ordering::SeqCst);
        let found = self.inner.find_one_by(attribute, value).await;
        self.reply_delay().await;
        found
    }

    async fn find_all_by(&self, attribute: &str, value: &Value) -> StorageResult<Vec<E>> {
        self.inner.find_all_by(attribute, value).await
    }

    async fn create(&self, entity: &E) -> StorageResult<E> {
        self.inner.create(entity).await
    }

    async fn update(&self, entity: &E) -> StorageResult<E> {
        self.inner.update(entity).await
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.inner.delete(id).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

pub fn test_lock(kv: DynKeyValueStore) -> DistributedLock {
    DistributedLock::new(
        kv,
        LockConfig {
            lease_ms: 1000,
            retry_count: 100,
            retry_delay_ms: 5,
            retry_jitter_ms: 2,
        },
    )
}

/// Which record cache a fixture uses.
#[derive(Debug, Clone, Copy)]
pub enum Backend {
    Local,
    Shared,
}

/// A counted store, its evented wrapper and an attached primary cache.
pub struct Fixture<E: Entity> {
    pub kv: DynKeyValueStore,
    pub counting: Arc<CountingStore<E>>,
    pub hooks: Arc<HookRegistry<E>>,
    pub store: EventedStore<E>,
    pub cache: Arc<PrimaryCache<E>>,
}

pub fn fixture<E: Entity>(backend: Backend) -> Fixture<E> {
    fixture_on(backend, Arc::new(MemoryStore::new()))
}

pub fn fixture_on<E: Entity>(backend: Backend, kv: DynKeyValueStore) -> Fixture<E> {
    let counting = Arc::new(CountingStore::<E>::new(Duration::from_millis(20)));
    let hooks = HookRegistry::new_shared();
    let store = EventedStore::new(counting.clone(), hooks.clone());

    let records: DynRecordCache = match backend {
        Backend::Local => Arc::new(LocalCache::new()),
        Backend::Shared => Arc::new(SharedCache::new(kv.clone(), Some(Duration::from_secs(60)))),
    };
    let cache = Arc::new(PrimaryCache::new(
        counting.clone(),
        records,
        test_lock(kv.clone()),
    ));
    cache.attach(&hooks);

    Fixture {
        kv,
        counting,
        hooks,
        store,
        cache,
    }
}
