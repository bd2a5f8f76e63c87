//! # keygate-storage
//!
//! Entity store abstraction for Keygate.
//!
//! This crate defines the contract every durable store backend implements and
//! the lifecycle hook machinery the cache layer binds to.
//!
//! ## Overview
//!
//! - [`Entity`] maps a domain type to its persisted attribute set.
//! - [`EntityStore`] is the CRUD plus attribute-query contract.
//! - [`MemoryEntityStore`] is the in-process backend.
//! - [`HookRegistry`] holds named [`LifecycleHook`]s per [`LifecycleEvent`].
//! - [`EventedStore`] wraps any store and dispatches those hooks on mutation.
//!
//! ## Example
//!
//! ```ignore
//! use keygate_storage::{EntityStore, EventedStore, HookRegistry, MemoryEntityStore};
//!
//! let hooks = HookRegistry::new_shared();
//! let store = EventedStore::new(Arc::new(MemoryEntityStore::<Token>::new()), hooks.clone());
//! let token = store.find_by_id(&id, &[]).await?;
//! ```

mod error;
pub mod evented;
pub mod hooks;
pub mod memory;
mod traits;

pub use error::{ErrorCategory, StorageError, StorageResult};
pub use evented::EventedStore;
pub use hooks::{HookContext, HookRegistry, LifecycleEvent, LifecycleHook};
pub use memory::MemoryEntityStore;
pub use traits::{Attributes, Entity, EntityStore, project};

/// Type alias for a shared entity store trait object.
pub type DynEntityStore<E> = std::sync::Arc<dyn EntityStore<E>>;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Entity, EntityStore, EventedStore, HookContext, HookRegistry, LifecycleEvent,
        LifecycleHook, StorageError, StorageResult,
    };
}
