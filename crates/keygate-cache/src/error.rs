//! Cache layer errors.
//!
//! Cache misses and undecodable cached payloads are not errors; they fall
//! through to the entity store. Everything here is terminal for the caller.

use keygate_storage::StorageError;

/// Errors surfaced by caches, the secondary index and the distributed lock.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The entity store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The shared key-value store failed or was unreachable.
    #[error("Key-value store error: {message}")]
    KeyValue {
        /// Description of the failure.
        message: String,
    },

    /// The distributed lock could not be acquired within the bounded wait.
    #[error("Timed out acquiring lock on '{resource}'")]
    LockTimeout {
        /// The lock resource key.
        resource: String,
    },

    /// A record could not be encoded for the cache.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },
}

impl CacheError {
    /// Creates a new `KeyValue` error.
    #[must_use]
    pub fn key_value(message: impl Into<String>) -> Self {
        Self::KeyValue {
            message: message.into(),
        }
    }

    /// Creates a new `LockTimeout` error.
    #[must_use]
    pub fn lock_timeout(resource: impl Into<String>) -> Self {
        Self::LockTimeout {
            resource: resource.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a lock timeout.
    #[must_use]
    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Converts the error into a hook failure so it aborts the mutation that
    /// triggered it.
    #[must_use]
    pub fn into_hook_error(self, hook: &str) -> StorageError {
        match self {
            Self::Storage(err) => err,
            other => StorageError::hook(hook, other.to_string()),
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::key_value(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::key_value(format!("pool: {err}"))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Type alias for cache results.
pub type CacheResult<T> = Result<T, CacheError>;
