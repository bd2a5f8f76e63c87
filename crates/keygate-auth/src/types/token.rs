//! Access token entity.

use keygate_storage::Entity;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use super::scope::{ScopeHolder, Scopes};
use super::secret::{Secret, SecretHolder};

/// An issued access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub secret: Secret,
    #[serde(default)]
    pub scopes: Scopes,
    /// Scopes the client asked for, before narrowing to the grant.
    #[serde(default)]
    pub request_scopes: Scopes,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime after the last refresh, in milliseconds. `0` never expires.
    #[serde(default)]
    pub expires_in_ms: u64,
    #[serde(default)]
    pub member_id: Option<i64>,
    #[serde(default)]
    pub application_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Token {
    /// A fresh token with a new id and secret.
    pub fn new(application_id: Option<Uuid>, scopes: Scopes, expires_in_ms: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            secret: Secret::generate(),
            request_scopes: scopes.clone(),
            scopes,
            refresh_token: None,
            expires_in_ms,
            member_id: None,
            application_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// When the token was last refreshed.
    pub fn last_refreshed(&self) -> OffsetDateTime {
        self.updated_at
    }

    /// When the token stops being valid, `None` if it never expires.
    ///
    /// A lifetime reaching past the representable date range counts as never.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        if self.expires_in_ms == 0 {
            return None;
        }
        let lifetime = i64::try_from(self.expires_in_ms).ok()?;
        self.last_refreshed()
            .checked_add(Duration::milliseconds(lifetime))
    }

    /// Returns `true` once `now` is past the expiry.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }
}

impl Entity for Token {
    const ENTITY_TYPE: &'static str = "tokens";

    fn id(&self) -> String {
        self.id.to_string()
    }
}

impl ScopeHolder for Token {
    fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    fn scopes_mut(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

impl SecretHolder for Token {
    fn secret(&self) -> &Secret {
        &self.secret
    }

    fn set_secret(&mut self, secret: Secret) {
        self.secret = secret;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_refreshed_at(offset_ms: i64, expires_in_ms: u64) -> (Token, OffsetDateTime) {
        let now = OffsetDateTime::now_utc();
        let mut token = Token::new(None, Scopes::default(), expires_in_ms);
        token.updated_at = now + Duration::milliseconds(offset_ms);
        (token, now)
    }

    #[test]
    fn test_expiry_window() {
        let (stale, now) = token_refreshed_at(-2000, 1000);
        assert!(stale.is_expired(now));

        let (fresh, now) = token_refreshed_at(0, 1000);
        assert!(!fresh.is_expired(now));
    }

    #[test]
    fn test_zero_lifetime_never_expires() {
        let (token, now) = token_refreshed_at(-1_000_000_000, 0);
        assert_eq!(token.expires_at(), None);
        assert!(!token.is_expired(now));
    }

    #[test]
    fn test_application_id_is_a_plain_string_attribute() {
        let app = Uuid::new_v4();
        let token = Token::new(Some(app), Scopes::new(["read"]), 0);
        assert_eq!(
            token.attribute("application_id"),
            Some(serde_json::Value::String(app.to_string()))
        );
    }
}
