//! Authenticated principals and their extractors.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::AuthError;
use crate::types::{Application, Token};

/// Request extension set by the gate for bearer-authenticated requests.
#[derive(Debug, Clone)]
pub struct AuthenticatedToken(pub Token);

/// Request extension set by the gate for Basic-authenticated clients.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient(pub Application);

/// Extractor requiring a bearer-authenticated caller.
///
/// ```ignore
/// async fn me(BearerAuth(token): BearerAuth) -> Json<Value> {
///     Json(json!({ "id": token.id }))
/// }
/// ```
pub struct BearerAuth(pub Token);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedToken>()
            .map(|AuthenticatedToken(token)| Self(token.clone()))
            .ok_or_else(|| AuthError::invalid_token("bearer token required"))
    }
}

/// Extractor for routes that accept anonymous callers.
pub struct OptionalBearerAuth(pub Option<Token>);

impl<S> FromRequestParts<S> for OptionalBearerAuth
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(
            parts
                .extensions
                .get::<AuthenticatedToken>()
                .map(|AuthenticatedToken(token)| token.clone()),
        ))
    }
}

/// Extractor requiring a Basic-authenticated client application.
pub struct ClientAuth(pub Application);

impl<S> FromRequestParts<S> for ClientAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedClient>()
            .map(|AuthenticatedClient(app)| Self(app.clone()))
            .ok_or_else(|| AuthError::invalid_client("client authentication required"))
    }
}
