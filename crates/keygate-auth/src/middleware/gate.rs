//! Request authentication gate.
//!
//! Runs once per request as `axum::middleware::from_fn_with_state`:
//!
//! 1. Take the `Authorization` header. When it is missing or unusable, fall
//!    back to the `access_token` body field of form-encoded requests.
//! 2. `Bearer <token>` resolves a [`Token`](crate::types::Token);
//!    `Basic <base64(id:secret)>` resolves an
//!    [`Application`](crate::types::Application).
//! 3. On success the principal is stored in the request extensions. On failure
//!    the request is answered with the rendered [`AuthError`].
//!
//! A request without a recognized credential passes through anonymously.

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::credentials::Credentials;
use crate::error::AuthError;

use super::types::{AuthenticatedClient, AuthenticatedToken};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const ACCESS_TOKEN_FIELD: &str = "access_token";

/// State for the authentication gate.
#[derive(Clone)]
pub struct AuthState {
    pub credentials: Arc<Credentials>,
    /// Upper bound when buffering a form body to look for `access_token`.
    pub body_limit: usize,
}

impl AuthState {
    pub fn new(credentials: Arc<Credentials>, body_limit: usize) -> Self {
        Self {
            credentials,
            body_limit,
        }
    }
}

/// A credential presented by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    Basic(String),
}

impl Credential {
    /// Classifies an `Authorization` header value. The scheme is
    /// case-insensitive; unknown schemes and empty credentials yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let (scheme, content) = value.trim().split_once(' ')?;
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        if scheme.eq_ignore_ascii_case("bearer") {
            Some(Self::Bearer(content.to_string()))
        } else if scheme.eq_ignore_ascii_case("basic") {
            Some(Self::Basic(content.to_string()))
        } else {
            None
        }
    }
}

/// Authentication middleware.
pub async fn authenticate(State(state): State<AuthState>, request: Request, next: Next) -> Response {
    let (credential, mut request) = match extract_credential(request, state.body_limit).await {
        Ok(found) => found,
        Err(response) => return response,
    };

    match credential {
        None => next.run(request).await,
        Some(Credential::Bearer(token)) => {
            match state.credentials.authenticate_bearer(&token).await {
                Ok(token) => {
                    tracing::debug!(token = %token.id, "bearer authenticated");
                    request.extensions_mut().insert(AuthenticatedToken(token));
                    next.run(request).await
                }
                Err(err) => reject(err),
            }
        }
        Some(Credential::Basic(content)) => {
            let mut response = match state.credentials.authenticate_basic(&content).await {
                Ok(application) => {
                    tracing::debug!(application = %application.id, "client authenticated");
                    request
                        .extensions_mut()
                        .insert(AuthenticatedClient(application));
                    next.run(request).await
                }
                Err(err) => reject(err),
            };
            let headers = response.headers_mut();
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
    }
}

fn reject(err: AuthError) -> Response {
    if err.is_rejection() {
        tracing::debug!(error = %err, "credential rejected");
    }
    err.into_response()
}

/// Finds the presented credential, buffering a form body when needed.
///
/// The returned request carries the body, rebuilt when it was buffered.
async fn extract_credential(
    request: Request,
    body_limit: usize,
) -> Result<(Option<Credential>, Request), Response> {
    let from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(Credential::parse);
    if from_header.is_some() {
        return Ok((from_header, request));
    }
    // An unusable header still lets a form `access_token` through.
    if !is_form(&request) {
        return Ok((None, request));
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, body_limit).await.map_err(|err| {
        tracing::debug!(error = %err, "form body unreadable");
        StatusCode::PAYLOAD_TOO_LARGE.into_response()
    })?;
    let credential = url::form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == ACCESS_TOKEN_FIELD)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .map(Credential::Bearer);
    Ok((credential, Request::from_parts(parts, Body::from(bytes))))
}

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}
