//! Axum integration: the authentication gate, principal extractors and
//! error rendering.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware::from_fn_with_state, routing::get};
//! use keygate_auth::middleware::{AuthState, BearerAuth, authenticate};
//!
//! async fn me(BearerAuth(token): BearerAuth) -> String {
//!     token.id.to_string()
//! }
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .layer(from_fn_with_state(auth_state, authenticate));
//! ```

pub mod error;
mod gate;
mod types;

pub use gate::{AuthState, Credential, authenticate};
pub use types::{AuthenticatedClient, AuthenticatedToken, BearerAuth, ClientAuth, OptionalBearerAuth};
