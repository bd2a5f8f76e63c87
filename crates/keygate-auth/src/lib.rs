//! # keygate-auth
//!
//! Credential entities and request authentication for Keygate.
//!
//! - [`Application`] and [`Token`] are the credential entities, composed from
//!   the [`ScopeHolder`] and [`SecretHolder`] capabilities.
//! - [`Credentials`] wires their caches and invalidation hooks and exposes
//!   issue, refresh, suspend and authenticate operations.
//! - [`middleware`] holds the axum gate that resolves `Bearer` and `Basic`
//!   credentials per request.

pub mod credentials;
mod error;
pub mod middleware;
pub mod revoke;
pub mod types;

pub use credentials::Credentials;
pub use error::{AuthError, AuthErrorCategory, AuthResult};
pub use revoke::RevokeOnSuspend;
pub use types::{Application, ScopeHolder, Scopes, Secret, SecretHolder, Token};
