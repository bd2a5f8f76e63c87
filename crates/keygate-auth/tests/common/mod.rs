//! Shared fixtures for auth integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use keygate_auth::{Application, Credentials, Scopes};
use keygate_cache::{DistributedLock, LockConfig, MemoryStore, SharedCache};
use keygate_storage::MemoryEntityStore;

pub struct Harness {
    pub kv: Arc<MemoryStore>,
    pub credentials: Arc<Credentials>,
}

pub fn harness() -> Harness {
    let kv = Arc::new(MemoryStore::new());
    let lock = DistributedLock::new(
        kv.clone(),
        LockConfig {
            lease_ms: 1000,
            retry_count: 100,
            retry_delay_ms: 5,
            retry_jitter_ms: 0,
        },
    );
    let credentials = Credentials::assemble(
        Arc::new(MemoryEntityStore::new()),
        Arc::new(MemoryEntityStore::new()),
        Arc::new(SharedCache::new(kv.clone(), None)),
        lock,
    );
    Harness {
        kv,
        credentials: Arc::new(credentials),
    }
}

pub async fn registered(harness: &Harness, scopes: &[&str]) -> Application {
    harness
        .credentials
        .register_application(&Application::new(
            "test-client",
            Scopes::new(scopes.iter().copied()),
        ))
        .await
        .unwrap()
}
