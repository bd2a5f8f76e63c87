//! Client application entity.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use keygate_storage::Entity;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::scope::{ScopeHolder, Scopes};
use super::secret::{Secret, SecretHolder};

/// A registered client application.
///
/// Applications authenticate with HTTP Basic credentials built from their id
/// and the external form of their secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: Uuid,
    pub secret: Secret,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub scopes: Scopes,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub member_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Application {
    /// A new, active application with a fresh id and secret.
    pub fn new(name: impl Into<String>, scopes: Scopes) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            secret: Secret::generate(),
            name: name.into(),
            url: None,
            description: None,
            redirect_uri: None,
            logo: None,
            scopes,
            suspended: false,
            member_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Basic credentials content: `base64(id ":" encodedSecret)`.
    pub fn encode_basic_auth(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.id, self.encode_secret()))
    }

    /// Splits Basic credentials content into `(id, encodedSecret)`.
    ///
    /// Returns `None` if the content is not base64 or has no `:` separator.
    /// The id is returned unparsed.
    pub fn decode_basic_auth(content: &str) -> Option<(String, String)> {
        let decoded = STANDARD.decode(content.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (id, secret) = decoded.split_once(':')?;
        Some((id.to_string(), secret.to_string()))
    }
}

impl Entity for Application {
    const ENTITY_TYPE: &'static str = "applications";

    fn id(&self) -> String {
        self.id.to_string()
    }
}

impl ScopeHolder for Application {
    fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    fn scopes_mut(&mut self) -> &mut Scopes {
        &mut self.scopes
    }
}

impl SecretHolder for Application {
    fn secret(&self) -> &Secret {
        &self.secret
    }

    fn set_secret(&mut self, secret: Secret) {
        self.secret = secret;
    }
}
