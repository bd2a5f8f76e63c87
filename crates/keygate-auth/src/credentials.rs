//! Credentials service: cached access to applications and tokens.
//!
//! [`Credentials::assemble`] is the one place the credential caches are wired
//! together:
//!
//! - a [`PrimaryCache`] per entity type, kept coherent by lifecycle hooks;
//! - a [`SecondaryIndex`] on the token secret, used by bearer authentication;
//! - a [`ClearCacheOf`](keygate_cache::ClearCacheOf) cascade evicting an
//!   application's cached tokens when the application is destroyed;
//! - [`RevokeOnSuspend`], destroying an application's tokens when it is
//!   suspended.
//!
//! Every mutation goes through an [`EventedStore`] so the hooks above run
//! before the call returns.

use std::sync::Arc;

use keygate_cache::{DistributedLock, DynRecordCache, PrimaryCache, SecondaryIndex, clear_cache_of};
use keygate_storage::{DynEntityStore, EntityStore, EventedStore, HookRegistry};
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::revoke::RevokeOnSuspend;
use crate::types::{Application, ScopeHolder, Scopes, Secret, SecretHolder, Token};

/// Attribute the token secret index is built on.
pub const TOKEN_SECRET_ATTRIBUTE: &str = "secret";

/// Cached, hook-maintained access to credential entities.
pub struct Credentials {
    applications: EventedStore<Application>,
    tokens: EventedStore<Token>,
    application_cache: Arc<PrimaryCache<Application>>,
    token_cache: Arc<PrimaryCache<Token>>,
    token_secrets: Arc<SecondaryIndex<Token>>,
}

impl Credentials {
    /// Wires caches and hooks over the given stores.
    ///
    /// `records` is shared by both entity types; keys are namespaced by type.
    pub fn assemble(
        applications: DynEntityStore<Application>,
        tokens: DynEntityStore<Token>,
        records: DynRecordCache,
        lock: DistributedLock,
    ) -> Self {
        let application_hooks = HookRegistry::new_shared();
        let token_hooks = HookRegistry::new_shared();

        let application_cache = Arc::new(PrimaryCache::new(
            applications.clone(),
            records.clone(),
            lock.clone(),
        ));
        application_cache.attach(&application_hooks);

        let token_cache = Arc::new(PrimaryCache::new(tokens.clone(), records, lock));
        token_cache.attach(&token_hooks);

        let token_secrets = Arc::new(SecondaryIndex::with_primary(
            TOKEN_SECRET_ATTRIBUTE,
            token_cache.clone(),
        ));
        token_secrets.attach(&token_hooks);

        let applications = EventedStore::new(applications, application_hooks.clone());
        let tokens = EventedStore::new(tokens, token_hooks);

        clear_cache_of(token_cache.clone(), "application_id").attach(&application_hooks);
        RevokeOnSuspend::new(tokens.clone()).attach(&application_hooks);

        info!(
            applications = applications.inner().backend_name(),
            tokens = tokens.inner().backend_name(),
            "credential caches assembled"
        );

        Self {
            applications,
            tokens,
            application_cache,
            token_cache,
            token_secrets,
        }
    }

    pub fn applications(&self) -> &EventedStore<Application> {
        &self.applications
    }

    pub fn tokens(&self) -> &EventedStore<Token> {
        &self.tokens
    }

    pub fn application_cache(&self) -> &Arc<PrimaryCache<Application>> {
        &self.application_cache
    }

    pub fn token_cache(&self) -> &Arc<PrimaryCache<Token>> {
        &self.token_cache
    }

    pub fn token_secrets(&self) -> &Arc<SecondaryIndex<Token>> {
        &self.token_secrets
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn find_application(&self, id: &Uuid) -> AuthResult<Option<Application>> {
        Ok(self.application_cache.get(&id.to_string()).await?)
    }

    pub async fn find_token(&self, id: &Uuid) -> AuthResult<Option<Token>> {
        Ok(self.token_cache.get(&id.to_string()).await?)
    }

    /// Fetches tokens aligned with `ids`.
    pub async fn find_tokens(&self, ids: &[Uuid]) -> AuthResult<Vec<Option<Token>>> {
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        Ok(self.token_cache.get_batch(&ids).await?)
    }

    /// Looks a token up by its stored secret.
    pub async fn find_token_by_secret(&self, secret: &Secret) -> AuthResult<Option<Token>> {
        Ok(self
            .token_secrets
            .find_by_attribute(secret.as_hex())
            .await?)
    }

    // ---------------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------------

    pub async fn register_application(&self, application: &Application) -> AuthResult<Application> {
        let created = self.applications.create(application).await?;
        info!(application = %created.id, name = %created.name, "application registered");
        Ok(created)
    }

    pub async fn update_application(&self, application: &Application) -> AuthResult<Application> {
        let mut next = application.clone();
        next.updated_at = OffsetDateTime::now_utc();
        Ok(self.applications.update(&next).await?)
    }

    /// Issues a token for `application` carrying `requested` scopes.
    ///
    /// # Errors
    ///
    /// `InvalidClient` if the application is suspended, `InvalidGrant` if the
    /// request exceeds the application's scopes.
    pub async fn issue_token(
        &self,
        application: &Application,
        requested: &[&str],
        expires_in_ms: u64,
    ) -> AuthResult<Token> {
        if application.suspended {
            return Err(AuthError::invalid_client("application is suspended"));
        }
        if application.is_scope_exceeded(requested) {
            return Err(AuthError::invalid_grant(
                "requested scope exceeds the application's grant",
            ));
        }

        let mut token = Token::new(
            Some(application.id),
            Scopes::new(requested.iter().copied()),
            expires_in_ms,
        );
        token.member_id = application.member_id;
        let created = self.tokens.create(&token).await?;
        debug!(token = %created.id, application = %application.id, "token issued");
        Ok(created)
    }

    pub async fn update_token(&self, token: &Token) -> AuthResult<Token> {
        Ok(self.tokens.update(token).await?)
    }

    /// Restarts a token's expiry window.
    pub async fn refresh_token(&self, id: &Uuid) -> AuthResult<Token> {
        let mut token = self
            .find_token(id)
            .await?
            .ok_or_else(|| AuthError::invalid_token("unknown token"))?;
        token.updated_at = OffsetDateTime::now_utc();
        let refreshed = self.tokens.update(&token).await?;
        debug!(token = %id, "token refreshed");
        Ok(refreshed)
    }

    pub async fn revoke_token(&self, id: &Uuid) -> AuthResult<()> {
        Ok(self.tokens.delete(&id.to_string()).await?)
    }

    /// Suspends an application, revoking every token it issued.
    pub async fn suspend_application(&self, id: &Uuid) -> AuthResult<Application> {
        let mut application = self
            .applications
            .find_by_id(&id.to_string(), &[])
            .await?
            .ok_or_else(|| AuthError::invalid_client("unknown application"))?;
        if application.suspended {
            return Ok(application);
        }
        application.suspended = true;
        self.update_application(&application).await
    }

    pub async fn destroy_application(&self, id: &Uuid) -> AuthResult<()> {
        Ok(self.applications.delete(&id.to_string()).await?)
    }

    // ---------------------------------------------------------------------
    // Authentication
    // ---------------------------------------------------------------------

    /// Resolves a bearer token (external form) valid at the current time.
    pub async fn authenticate_bearer(&self, external: &str) -> AuthResult<Token> {
        self.authenticate_bearer_at(external, OffsetDateTime::now_utc())
            .await
    }

    /// Resolves a bearer token (external form) valid at `now`.
    ///
    /// # Errors
    ///
    /// `InvalidToken` if the token does not decode, is unknown, or expired.
    pub async fn authenticate_bearer_at(
        &self,
        external: &str,
        now: OffsetDateTime,
    ) -> AuthResult<Token> {
        let secret = Token::decode_secret(external)
            .ok_or_else(|| AuthError::invalid_token("token is malformed"))?;
        let token = self
            .find_token_by_secret(&secret)
            .await?
            .ok_or_else(|| AuthError::invalid_token("token is unknown"))?;
        if token.is_expired(now) {
            return Err(AuthError::invalid_token("token has expired"));
        }
        Ok(token)
    }

    /// Resolves an application from Basic credentials content.
    ///
    /// # Errors
    ///
    /// `InvalidGrant` if the content does not decode or the id is not a UUID;
    /// `InvalidClient` if the application is unknown, suspended, or the
    /// secret does not match.
    pub async fn authenticate_basic(&self, content: &str) -> AuthResult<Application> {
        let (id, encoded) = Application::decode_basic_auth(content)
            .ok_or_else(|| AuthError::invalid_grant("malformed client credentials"))?;
        let id = Uuid::parse_str(&id)
            .map_err(|_| AuthError::invalid_grant("client id is not a valid identifier"))?;

        let application = self
            .find_application(&id)
            .await?
            .ok_or_else(|| AuthError::invalid_client("unknown client"))?;
        if application.suspended {
            return Err(AuthError::invalid_client("client is suspended"));
        }
        let matches = Application::decode_secret(&encoded)
            .is_some_and(|presented| &presented == application.secret());
        if !matches {
            return Err(AuthError::invalid_client("client secret mismatch"));
        }
        Ok(application)
    }
}
