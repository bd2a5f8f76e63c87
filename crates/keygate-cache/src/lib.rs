//! # keygate-cache
//!
//! Cache-aside access to entity stores for Keygate.
//!
//! ## Overview
//!
//! - [`KeyValueStore`]: the shared substrate (Redis or in-process).
//! - [`DistributedLock`]: lease-based mutual exclusion over that substrate.
//! - [`RecordCache`]: where cached attribute maps live ([`LocalCache`] or
//!   [`SharedCache`]).
//! - [`PrimaryCache`]: lookup by primary id with lock-collapsed fills.
//! - [`SecondaryIndex`]: lookup by an alternate unique attribute with a
//!   negative cache.
//! - [`ClearCacheOf`]: evicts dependents when a parent is destroyed.
//!
//! Caches stay coherent by attaching themselves to a
//! [`keygate_storage::HookRegistry`] shared with an
//! [`keygate_storage::EventedStore`].
//!
//! ## Example
//!
//! ```ignore
//! let kv = create_kv_store(&redis_config).await;
//! let lock = DistributedLock::new(kv.clone(), LockConfig::default());
//! let tokens = Arc::new(PrimaryCache::new(
//!     store.clone(),
//!     Arc::new(SharedCache::new(kv, Some(Duration::from_secs(3600)))),
//!     lock,
//! ));
//! tokens.attach(&hooks);
//! let token = tokens.get(&id).await?;
//! ```

pub mod cascade;
mod error;
pub mod index;
pub mod kv;
pub mod lock;
pub mod metrics;
pub mod primary;
pub mod record;

pub use cascade::{ClearCacheOf, clear_cache_of};
pub use error::{CacheError, CacheResult};
pub use index::{IndexEntry, SecondaryIndex};
pub use kv::{
    DynKeyValueStore, KeyValueStore, MemoryStore, RedisConfig, RedisStore, WindowCount,
    create_kv_store,
};
pub use lock::{DistributedLock, LockConfig, LockGuard};
pub use primary::PrimaryCache;
pub use record::{DynRecordCache, LocalCache, RecordCache, SharedCache, cache_key};
