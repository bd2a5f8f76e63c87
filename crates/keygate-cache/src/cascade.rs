//! Cross-entity cache cascade.
//!
//! [`ClearCacheOf`] binds to a parent entity's `BeforeDestroy` and evicts every
//! dependent row that references the parent through a foreign key.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use keygate_storage::{
    Entity, HookContext, HookRegistry, LifecycleEvent, LifecycleHook, StorageResult,
};
use serde_json::Value;

use crate::error::CacheResult;
use crate::primary::PrimaryCache;

/// Evicts `D` rows whose `foreign_key` equals a destroyed parent's id.
pub struct ClearCacheOf<D: Entity> {
    cache: Arc<PrimaryCache<D>>,
    foreign_key: String,
    _dependent: PhantomData<fn() -> D>,
}

/// Builds a [`ClearCacheOf`] hook for the dependent type cached by `cache`.
pub fn clear_cache_of<D: Entity>(
    cache: Arc<PrimaryCache<D>>,
    foreign_key: impl Into<String>,
) -> Arc<ClearCacheOf<D>> {
    Arc::new(ClearCacheOf {
        cache,
        foreign_key: foreign_key.into(),
        _dependent: PhantomData,
    })
}

impl<D: Entity> ClearCacheOf<D> {
    /// Name the hook registers under.
    pub fn hook_name(&self) -> String {
        format!("clear_cache_of:{}.{}", D::ENTITY_TYPE, self.foreign_key)
    }

    /// Registers the hook on the parent's `BeforeDestroy`.
    pub fn attach<P: Entity>(self: &Arc<Self>, hooks: &HookRegistry<P>) -> bool {
        let hook: Arc<dyn LifecycleHook<P>> = self.clone();
        hooks.register(LifecycleEvent::BeforeDestroy, self.hook_name(), hook)
    }

    /// Removes the hook from the parent's registry.
    pub fn detach<P: Entity>(&self, hooks: &HookRegistry<P>) -> bool {
        hooks.unregister(LifecycleEvent::BeforeDestroy, &self.hook_name())
    }

    /// Evicts every dependent of `parent_id`. Returns the number evicted.
    pub async fn evict_dependents_of(&self, parent_id: &str) -> CacheResult<usize> {
        let dependents = self
            .cache
            .store()
            .find_all_by(&self.foreign_key, &Value::String(parent_id.to_string()))
            .await?;
        let ids: Vec<String> = dependents.iter().map(Entity::id).collect();
        self.cache.remove_batch(&ids).await?;
        tracing::debug!(
            dependent = D::ENTITY_TYPE,
            foreign_key = %self.foreign_key,
            parent = %parent_id,
            evicted = ids.len(),
            "cascade eviction"
        );
        Ok(ids.len())
    }
}

#[async_trait]
impl<P: Entity, D: Entity> LifecycleHook<P> for ClearCacheOf<D> {
    async fn handle(&self, ctx: &HookContext<'_, P>) -> StorageResult<()> {
        if let HookContext::Destroying(parent) = ctx {
            self.evict_dependents_of(&parent.id())
                .await
                .map_err(|e| e.into_hook_error(&self.hook_name()))?;
        }
        Ok(())
    }
}
