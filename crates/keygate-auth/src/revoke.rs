//! Token revocation when an application is suspended.
//!
//! Evicting cached tokens is not enough here: a token still present in the
//! entity store would simply be read back on the next miss. The hook destroys
//! the tokens through their evented store so each one's cache and index
//! entries go with it.

use std::sync::Arc;

use async_trait::async_trait;
use keygate_storage::{
    EventedStore, HookContext, HookRegistry, LifecycleEvent, LifecycleHook, StorageResult,
};
use serde_json::Value;

use crate::types::{Application, Token};

/// Hook name on the application registry.
pub const HOOK_NAME: &str = "revoke_tokens_on_suspend";

/// Destroys an application's tokens when it transitions to suspended.
pub struct RevokeOnSuspend {
    tokens: EventedStore<Token>,
}

impl RevokeOnSuspend {
    pub fn new(tokens: EventedStore<Token>) -> Self {
        Self { tokens }
    }

    /// Registers on `BeforeUpdate`, so tokens are gone before the suspended
    /// application is persisted. Returns `false` if already registered.
    pub fn attach(self, hooks: &HookRegistry<Application>) -> bool {
        hooks.register(LifecycleEvent::BeforeUpdate, HOOK_NAME, Arc::new(self))
    }

    pub fn detach(hooks: &HookRegistry<Application>) -> bool {
        hooks.unregister(LifecycleEvent::BeforeUpdate, HOOK_NAME)
    }
}

#[async_trait]
impl LifecycleHook<Application> for RevokeOnSuspend {
    async fn handle(&self, ctx: &HookContext<'_, Application>) -> StorageResult<()> {
        let HookContext::Updating { previous, next } = ctx else {
            return Ok(());
        };
        if previous.suspended || !next.suspended {
            return Ok(());
        }

        let revoked = self
            .tokens
            .destroy_where("application_id", &Value::String(next.id.to_string()))
            .await?;
        tracing::info!(application = %next.id, revoked, "application suspended, tokens revoked");
        Ok(())
    }
}
