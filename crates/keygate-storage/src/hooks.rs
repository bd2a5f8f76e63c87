//! Lifecycle hook registry.
//!
//! Cache and index components subscribe to entity mutations by registering
//! named [`LifecycleHook`]s for a [`LifecycleEvent`]. The registry is owned by
//! whoever assembles the store stack and is handed to components explicitly;
//! nothing registers itself through global state.
//!
//! Hook names are unique per event: registering the same name twice is a
//! no-op, and [`HookRegistry::unregister`] detaches a hook again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StorageResult;
use crate::traits::Entity;

/// Entity lifecycle points that hooks can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// After a new entity has been persisted.
    AfterCreate,
    /// Before an update is persisted; the previous row is still current.
    BeforeUpdate,
    /// After an update has been persisted.
    AfterUpdate,
    /// Before an entity is deleted.
    BeforeDestroy,
    /// After an entity has been deleted.
    AfterDestroy,
}

impl LifecycleEvent {
    /// All events, in lifecycle order.
    pub const ALL: [LifecycleEvent; 5] = [
        Self::AfterCreate,
        Self::BeforeUpdate,
        Self::AfterUpdate,
        Self::BeforeDestroy,
        Self::AfterDestroy,
    ];

    /// Stable name used in hook identifiers and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDestroy => "before_destroy",
            Self::AfterDestroy => "after_destroy",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The entity state handed to a hook.
#[derive(Debug)]
pub enum HookContext<'a, E> {
    /// The freshly created entity.
    Created(&'a E),
    /// An update about to be written.
    Updating { previous: &'a E, next: &'a E },
    /// An update that has been written.
    Updated { previous: &'a E, current: &'a E },
    /// The entity about to be deleted.
    Destroying(&'a E),
    /// The entity as it was before deletion.
    Destroyed(&'a E),
}

impl<'a, E: Entity> HookContext<'a, E> {
    /// The event this context belongs to.
    pub fn event(&self) -> LifecycleEvent {
        match self {
            Self::Created(_) => LifecycleEvent::AfterCreate,
            Self::Updating { .. } => LifecycleEvent::BeforeUpdate,
            Self::Updated { .. } => LifecycleEvent::AfterUpdate,
            Self::Destroying(_) => LifecycleEvent::BeforeDestroy,
            Self::Destroyed(_) => LifecycleEvent::AfterDestroy,
        }
    }

    /// The entity as it is (or is about to be) persisted.
    pub fn entity(&self) -> &'a E {
        match self {
            Self::Created(entity) | Self::Destroying(entity) | Self::Destroyed(entity) => entity,
            Self::Updating { next, .. } => next,
            Self::Updated { current, .. } => current,
        }
    }

    /// The previously persisted entity, for update events.
    pub fn previous(&self) -> Option<&'a E> {
        match self {
            Self::Updating { previous, .. } | Self::Updated { previous, .. } => Some(previous),
            _ => None,
        }
    }

    /// Returns `true` if `attribute` differs between the previous and new state.
    ///
    /// Always `false` for create and destroy events.
    pub fn changed(&self, attribute: &str) -> bool {
        match self.previous() {
            Some(previous) => previous.attribute(attribute) != self.entity().attribute(attribute),
            None => false,
        }
    }
}

/// A callback bound to an entity lifecycle event.
///
/// Hooks run sequentially and to completion before the mutating call returns.
/// A failing hook fails the mutation.
#[async_trait]
pub trait LifecycleHook<E: Entity>: Send + Sync {
    async fn handle(&self, ctx: &HookContext<'_, E>) -> StorageResult<()>;
}

type NamedHook<E> = (String, Arc<dyn LifecycleHook<E>>);

/// Event-subscription registry for one entity type.
pub struct HookRegistry<E: Entity> {
    hooks: RwLock<HashMap<LifecycleEvent, Vec<NamedHook<E>>>>,
}

impl<E: Entity> HookRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an empty registry wrapped in `Arc`.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers `hook` under `name` for `event`.
    ///
    /// Returns `false` (and leaves the registry untouched) if a hook with the
    /// same name is already registered for that event.
    pub fn register(
        &self,
        event: LifecycleEvent,
        name: impl Into<String>,
        hook: Arc<dyn LifecycleHook<E>>,
    ) -> bool {
        let name = name.into();
        let mut hooks = self.hooks.write();
        let bound = hooks.entry(event).or_default();
        if bound.iter().any(|(existing, _)| *existing == name) {
            return false;
        }
        tracing::debug!(entity = E::ENTITY_TYPE, %event, hook = %name, "hook registered");
        bound.push((name, hook));
        true
    }

    /// Removes the hook registered under `name` for `event`.
    ///
    /// Returns `false` if no such hook was registered.
    pub fn unregister(&self, event: LifecycleEvent, name: &str) -> bool {
        let mut hooks = self.hooks.write();
        let Some(bound) = hooks.get_mut(&event) else {
            return false;
        };
        let before = bound.len();
        bound.retain(|(existing, _)| existing != name);
        let removed = bound.len() != before;
        if removed {
            tracing::debug!(entity = E::ENTITY_TYPE, %event, hook = %name, "hook unregistered");
        }
        removed
    }

    /// Returns `true` if a hook named `name` is bound to `event`.
    pub fn is_registered(&self, event: LifecycleEvent, name: &str) -> bool {
        self.hooks
            .read()
            .get(&event)
            .is_some_and(|bound| bound.iter().any(|(existing, _)| existing == name))
    }

    /// Number of hooks bound to `event`.
    pub fn count(&self, event: LifecycleEvent) -> usize {
        self.hooks.read().get(&event).map_or(0, Vec::len)
    }

    /// Runs every hook bound to the context's event, in registration order.
    pub async fn dispatch(&self, ctx: &HookContext<'_, E>) -> StorageResult<()> {
        // Snapshot so no lock is held across await points.
        let bound: Vec<NamedHook<E>> = self
            .hooks
            .read()
            .get(&ctx.event())
            .cloned()
            .unwrap_or_default();

        for (name, hook) in bound {
            tracing::trace!(entity = E::ENTITY_TYPE, event = %ctx.event(), hook = %name, "running hook");
            hook.handle(ctx).await?;
        }
        Ok(())
    }
}

impl<E: Entity> Default for HookRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> fmt::Debug for HookRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks = self.hooks.read();
        let mut map = f.debug_map();
        for event in LifecycleEvent::ALL {
            let names: Vec<&str> = hooks
                .get(&event)
                .map(|bound| bound.iter().map(|(n, _)| n.as_str()).collect())
                .unwrap_or_default();
            map.entry(&event.as_str(), &names);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Item {
        id: String,
        label: String,
    }

    impl Entity for Item {
        const ENTITY_TYPE: &'static str = "items";

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    struct Counter(AtomicUsize);

    #[async_trait]
    impl LifecycleHook<Item> for Counter {
        async fn handle(&self, _ctx: &HookContext<'_, Item>) -> StorageResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn item(label: &str) -> Item {
        Item {
            id: "i1".into(),
            label: label.into(),
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent_per_name() {
        let registry = HookRegistry::<Item>::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));

        assert!(registry.register(LifecycleEvent::AfterCreate, "count", counter.clone()));
        assert!(!registry.register(LifecycleEvent::AfterCreate, "count", counter.clone()));
        assert_eq!(registry.count(LifecycleEvent::AfterCreate), 1);

        let created = item("a");
        registry
            .dispatch(&HookContext::Created(&created))
            .await
            .unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregister_detaches() {
        let registry = HookRegistry::<Item>::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        registry.register(LifecycleEvent::BeforeDestroy, "count", counter.clone());

        assert!(registry.unregister(LifecycleEvent::BeforeDestroy, "count"));
        assert!(!registry.unregister(LifecycleEvent::BeforeDestroy, "count"));
        assert!(!registry.is_registered(LifecycleEvent::BeforeDestroy, "count"));

        let doomed = item("a");
        registry
            .dispatch(&HookContext::Destroying(&doomed))
            .await
            .unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_changed_detection() {
        let previous = item("old");
        let current = item("new");

        let ctx = HookContext::Updated {
            previous: &previous,
            current: &current,
        };
        assert!(ctx.changed("label"));
        assert!(!ctx.changed("id"));
        assert_eq!(ctx.event(), LifecycleEvent::AfterUpdate);
        assert_eq!(ctx.entity().label, "new");

        let ctx = HookContext::Created(&current);
        assert!(!ctx.changed("label"));
        assert!(ctx.previous().is_none());
    }
}
