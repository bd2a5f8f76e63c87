//! Secondary index: alternate unique attribute to primary id.
//!
//! The index is process-local and never evicts. It records known-absent
//! values as well, so repeated lookups of unknown credentials do not reach the
//! entity store. The keyspace is the set of issued credentials, not arbitrary
//! user input, which bounds its growth.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use keygate_storage::{
    DynEntityStore, Entity, HookContext, HookRegistry, LifecycleEvent, LifecycleHook,
    StorageResult,
};
use serde_json::Value;

use crate::error::CacheResult;
use crate::primary::PrimaryCache;

const HOOK_EVENTS: [LifecycleEvent; 3] = [
    LifecycleEvent::AfterCreate,
    LifecycleEvent::AfterUpdate,
    LifecycleEvent::BeforeDestroy,
];

/// One index slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexEntry {
    /// The value belongs to this primary id.
    Id(String),
    /// No entity has this value (negative cache).
    Absent,
}

/// Maps values of one unique attribute to primary ids.
pub struct SecondaryIndex<E: Entity> {
    attribute: String,
    entries: DashMap<String, IndexEntry>,
    store: DynEntityStore<E>,
    primary: Option<Arc<PrimaryCache<E>>>,
}

impl<E: Entity> SecondaryIndex<E> {
    /// Indexes `attribute`, resolving ids directly against `store`.
    pub fn new(attribute: impl Into<String>, store: DynEntityStore<E>) -> Self {
        Self {
            attribute: attribute.into(),
            entries: DashMap::new(),
            store,
            primary: None,
        }
    }

    /// Indexes `attribute`, resolving ids through `primary`.
    pub fn with_primary(attribute: impl Into<String>, primary: Arc<PrimaryCache<E>>) -> Self {
        Self {
            attribute: attribute.into(),
            entries: DashMap::new(),
            store: primary.store().clone(),
            primary: Some(primary),
        }
    }

    /// The indexed attribute.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Name the index registers its hooks under.
    pub fn hook_name(&self) -> String {
        format!("secondary_index:{}.{}", E::ENTITY_TYPE, self.attribute)
    }

    /// The current slot for `value`, if any.
    pub fn entry(&self, value: &str) -> Option<IndexEntry> {
        self.entries.get(value).map(|e| e.value().clone())
    }

    /// Number of slots, negative ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index holds no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registers the maintenance hooks on `hooks`.
    pub fn attach(self: &Arc<Self>, hooks: &HookRegistry<E>) {
        let hook: Arc<dyn LifecycleHook<E>> = self.clone();
        let name = self.hook_name();
        for event in HOOK_EVENTS {
            hooks.register(event, name.clone(), hook.clone());
        }
    }

    /// Removes the maintenance hooks from `hooks`.
    pub fn detach(&self, hooks: &HookRegistry<E>) {
        let name = self.hook_name();
        for event in HOOK_EVENTS {
            hooks.unregister(event, &name);
        }
    }

    /// Finds the entity whose indexed attribute equals `value`.
    pub async fn find_by_attribute(&self, value: &str) -> CacheResult<Option<E>> {
        match self.entry(value) {
            Some(IndexEntry::Absent) => {
                tracing::trace!(attribute = %self.attribute, "index hit (absent)");
                Ok(None)
            }
            Some(IndexEntry::Id(id)) => {
                let found = self.resolve(&id).await?;
                if found.is_none() {
                    // Row vanished without passing through the hooks.
                    self.entries
                        .remove_if(value, |_, slot| *slot == IndexEntry::Id(id.clone()));
                }
                Ok(found)
            }
            None => {
                let found = self
                    .store
                    .find_one_by(&self.attribute, &Value::String(value.to_string()))
                    .await?;
                tracing::debug!(
                    entity = E::ENTITY_TYPE,
                    attribute = %self.attribute,
                    found = found.is_some(),
                    "index filled"
                );
                match &found {
                    Some(entity) => {
                        self.entries
                            .insert(value.to_string(), IndexEntry::Id(entity.id()));
                    }
                    // A create hook may have filled the slot since the query.
                    None => {
                        self.entries
                            .entry(value.to_string())
                            .or_insert(IndexEntry::Absent);
                    }
                }
                Ok(found)
            }
        }
    }

    async fn resolve(&self, id: &str) -> CacheResult<Option<E>> {
        match &self.primary {
            Some(primary) => primary.get(id).await,
            None => Ok(self.store.find_by_id(id, &[]).await?),
        }
    }

    fn indexed_value(&self, entity: &E) -> Option<String> {
        match entity.attribute(&self.attribute)? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

#[async_trait]
impl<E: Entity> LifecycleHook<E> for SecondaryIndex<E> {
    async fn handle(&self, ctx: &HookContext<'_, E>) -> StorageResult<()> {
        match ctx {
            HookContext::Created(entity) => {
                if let Some(value) = self.indexed_value(entity) {
                    self.entries.insert(value, IndexEntry::Id(entity.id()));
                }
            }
            HookContext::Updated { previous, current } => {
                if ctx.changed(&self.attribute) {
                    if let Some(old) = self.indexed_value(previous) {
                        self.entries.remove(&old);
                    }
                    if let Some(new) = self.indexed_value(current) {
                        self.entries.insert(new, IndexEntry::Id(current.id()));
                    }
                }
            }
            HookContext::Destroying(entity) => {
                if let Some(value) = self.indexed_value(entity) {
                    self.entries.remove(&value);
                }
            }
            HookContext::Updating { .. } | HookContext::Destroyed(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_storage::{EntityStore, EventedStore, MemoryEntityStore};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Key {
        id: String,
        secret: String,
    }

    impl Entity for Key {
        const ENTITY_TYPE: &'static str = "keys";

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    fn key(id: &str, secret: &str) -> Key {
        Key {
            id: id.into(),
            secret: secret.into(),
        }
    }

    fn setup() -> (EventedStore<Key>, Arc<SecondaryIndex<Key>>) {
        let hooks = HookRegistry::new_shared();
        let store = EventedStore::new(Arc::new(MemoryEntityStore::new()), hooks.clone());
        let index = Arc::new(SecondaryIndex::new(
            "secret",
            store.inner().clone(),
        ));
        index.attach(&hooks);
        (store, index)
    }

    #[tokio::test]
    async fn test_create_populates_slot() {
        let (store, index) = setup();
        store.create(&key("k1", "s1")).await.unwrap();

        assert_eq!(index.entry("s1"), Some(IndexEntry::Id("k1".into())));
        let found = index.find_by_attribute("s1").await.unwrap().unwrap();
        assert_eq!(found.id, "k1");
    }

    #[tokio::test]
    async fn test_update_moves_slot_only_on_change() {
        let (store, index) = setup();
        store.create(&key("k1", "s1")).await.unwrap();

        store.update(&key("k1", "s2")).await.unwrap();
        assert_eq!(index.entry("s1"), None);
        assert_eq!(index.entry("s2"), Some(IndexEntry::Id("k1".into())));
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_removes_rather_than_negates() {
        let (store, index) = setup();
        store.create(&key("k1", "s1")).await.unwrap();
        store.delete("k1").await.unwrap();

        assert_eq!(index.entry("s1"), None);
        assert!(index.find_by_attribute("s1").await.unwrap().is_none());
        assert_eq!(index.entry("s1"), Some(IndexEntry::Absent));
    }

    #[tokio::test]
    async fn test_detach_stops_maintenance() {
        let hooks = HookRegistry::new_shared();
        let store = EventedStore::new(Arc::new(MemoryEntityStore::new()), hooks.clone());
        let index = Arc::new(SecondaryIndex::new("secret", store.inner().clone()));
        index.attach(&hooks);
        index.detach(&hooks);

        store.create(&key("k1", "s1")).await.unwrap();
        assert!(index.is_empty());
    }
}
