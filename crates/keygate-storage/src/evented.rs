//! EventedStore - an entity store wrapper that runs lifecycle hooks around
//! every mutation.
//!
//! Reads are delegated untouched. Mutations load the current row when a hook
//! needs it, run `BeforeUpdate`/`BeforeDestroy` hooks before the inner write
//! and `AfterCreate`/`AfterUpdate`/`AfterDestroy` hooks after it. All hooks complete before
//! the mutating call returns, so callers in the same process observe their own
//! writes through any cache bound to the registry.
//!
//! # Example
//!
//! ```ignore
//! use keygate_storage::{EventedStore, HookRegistry, MemoryEntityStore};
//!
//! let hooks = HookRegistry::new_shared();
//! let tokens = EventedStore::new(Arc::new(MemoryEntityStore::<Token>::new()), hooks.clone());
//!
//! // Any hook registered on `hooks` runs before this returns.
//! tokens.create(&token).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::hooks::{HookContext, HookRegistry};
use crate::traits::{Entity, EntityStore};

/// An entity store wrapper that dispatches lifecycle hooks on mutation.
pub struct EventedStore<E: Entity> {
    inner: Arc<dyn EntityStore<E>>,
    hooks: Arc<HookRegistry<E>>,
}

impl<E: Entity> Clone for EventedStore<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<E: Entity> EventedStore<E> {
    /// Wraps `inner`, dispatching mutations to `hooks`.
    pub fn new(inner: Arc<dyn EntityStore<E>>, hooks: Arc<HookRegistry<E>>) -> Self {
        Self { inner, hooks }
    }

    /// The wrapped store. Writes through it bypass every hook.
    pub fn inner(&self) -> &Arc<dyn EntityStore<E>> {
        &self.inner
    }

    /// The hook registry this store dispatches to.
    pub fn hooks(&self) -> &Arc<HookRegistry<E>> {
        &self.hooks
    }

    /// Destroys every entity whose `attribute` equals `value`.
    ///
    /// Rows are deleted one at a time so each row's `BeforeDestroy` hooks
    /// run. Returns the number of rows destroyed.
    pub async fn destroy_where(&self, attribute: &str, value: &Value) -> StorageResult<usize> {
        let doomed = self.inner.find_all_by(attribute, value).await?;
        let mut destroyed = 0;
        for entity in &doomed {
            match self.destroy(entity).await {
                Ok(()) => destroyed += 1,
                // Raced with another deleter; the row is gone either way.
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        debug!(
            entity = E::ENTITY_TYPE,
            %attribute,
            destroyed,
            "destroyed matching entities"
        );
        Ok(destroyed)
    }

    async fn destroy(&self, entity: &E) -> StorageResult<()> {
        self.hooks.dispatch(&HookContext::Destroying(entity)).await?;
        self.inner.delete(&entity.id()).await?;
        self.hooks.dispatch(&HookContext::Destroyed(entity)).await
    }

    async fn current(&self, id: &str) -> StorageResult<E> {
        self.inner
            .find_by_id(id, &[])
            .await?
            .ok_or_else(|| StorageError::not_found(E::ENTITY_TYPE, id))
    }
}

#[async_trait]
impl<E: Entity> EntityStore<E> for EventedStore<E> {
    async fn find_by_id(&self, id: &str, select: &[String]) -> StorageResult<Option<E>> {
        self.inner.find_by_id(id, select).await
    }

    async fn find_by_ids(&self, ids: &[String], select: &[String]) -> StorageResult<Vec<E>> {
        self.inner.find_by_ids(ids, select).await
    }

    async fn find_one_by(&self, attribute: &str, value: &Value) -> StorageResult<Option<E>> {
        self.inner.find_one_by(attribute, value).await
    }

    async fn find_all_by(&self, attribute: &str, value: &Value) -> StorageResult<Vec<E>> {
        self.inner.find_all_by(attribute, value).await
    }

    async fn create(&self, entity: &E) -> StorageResult<E> {
        let created = self.inner.create(entity).await?;
        self.hooks.dispatch(&HookContext::Created(&created)).await?;
        debug!(entity = E::ENTITY_TYPE, id = %created.id(), "created");
        Ok(created)
    }

    async fn update(&self, entity: &E) -> StorageResult<E> {
        let previous = self.current(&entity.id()).await?;
        self.hooks
            .dispatch(&HookContext::Updating {
                previous: &previous,
                next: entity,
            })
            .await?;

        let current = self.inner.update(entity).await?;
        self.hooks
            .dispatch(&HookContext::Updated {
                previous: &previous,
                current: &current,
            })
            .await?;
        debug!(entity = E::ENTITY_TYPE, id = %current.id(), "updated");
        Ok(current)
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let entity = self.current(id).await?;
        self.destroy(&entity).await?;
        debug!(entity = E::ENTITY_TYPE, %id, "deleted");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
