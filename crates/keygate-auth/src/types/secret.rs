//! Opaque credential secrets and the [`SecretHolder`] capability.
//!
//! Secrets are stored as lowercase hex of a SHA-256 digest over 256 random
//! bytes. Clients see the same 32 bytes as standard base64.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const ENTROPY_BYTES: usize = 256;

/// Stored (hex) form of a credential secret.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Generates a fresh random secret.
    pub fn generate() -> Self {
        let mut entropy = [0u8; ENTROPY_BYTES];
        rand::thread_rng().fill_bytes(&mut entropy);
        Self(hex::encode(Sha256::digest(entropy)))
    }

    /// Wraps an already-stored hex secret.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Decodes the external (base64) form. `None` if it is not valid base64.
    pub fn from_external(external: &str) -> Option<Self> {
        let bytes = STANDARD.decode(external.trim()).ok()?;
        if bytes.is_empty() {
            return None;
        }
        Some(Self(hex::encode(bytes)))
    }

    /// The stored hex form.
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// The external (base64) form handed to clients.
    ///
    /// Empty if the stored form is not valid hex.
    pub fn to_external(&self) -> String {
        hex::decode(&self.0)
            .map(|bytes| STANDARD.encode(bytes))
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Capability of entities that carry an opaque secret.
pub trait SecretHolder {
    fn secret(&self) -> &Secret;

    fn set_secret(&mut self, secret: Secret);

    /// Replaces the secret with a freshly generated one.
    fn generate_secret(&mut self) {
        self.set_secret(Secret::generate());
    }

    /// The secret as handed to clients.
    fn encode_secret(&self) -> String {
        self.secret().to_external()
    }

    /// Converts a client-supplied secret into its stored form.
    fn decode_secret(external: &str) -> Option<Secret>
    where
        Self: Sized,
    {
        Secret::from_external(external)
    }
}
