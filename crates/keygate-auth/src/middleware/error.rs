//! Error response handling for authentication middleware.
//!
//! Rejections render as `{"error": <code>, "error_description": <message>}`.
//! Infrastructure failures render a generic 500 body; their detail is logged,
//! never returned.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

/// Realm advertised in `WWW-Authenticate` challenges.
pub const REALM: &str = "keygate";

const SERVER_ERROR_DESCRIPTION: &str = "Internal server error";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, description) = error_details(&self);
        let code = self.error_code();

        if !self.is_rejection() {
            tracing::error!(error = %self, category = %self.category(), "authentication failed");
        }

        let mut headers = HeaderMap::new();
        let challenge = match &self {
            AuthError::InvalidToken { .. } => Some(bearer_challenge(code, &description)),
            AuthError::InvalidClient { .. } => Some(format!("Basic realm=\"{REALM}\"")),
            _ => None,
        };
        if let Some(value) = challenge.and_then(|c| HeaderValue::from_str(&c).ok()) {
            headers.insert(header::WWW_AUTHENTICATE, value);
        }

        let body = json!({
            "error": code,
            "error_description": description,
        });
        (status, headers, Json(body)).into_response()
    }
}

/// Returns (HTTP status, client-facing description).
fn error_details(error: &AuthError) -> (StatusCode, String) {
    match error {
        AuthError::InvalidToken { message } | AuthError::InvalidClient { message } => {
            (StatusCode::UNAUTHORIZED, message.clone())
        }
        AuthError::InvalidGrant { message } => (StatusCode::BAD_REQUEST, message.clone()),
        AuthError::Storage { .. } | AuthError::Cache { .. } | AuthError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            SERVER_ERROR_DESCRIPTION.to_string(),
        ),
    }
}

/// Format: `Bearer realm="keygate", error="invalid_token", error_description="..."`
fn bearer_challenge(error: &str, description: &str) -> String {
    let escaped = description.replace('"', "\\\"");
    format!("Bearer realm=\"{REALM}\", error=\"{error}\", error_description=\"{escaped}\"")
}
