//! Fixed-window rate limiting per client identity.
//!
//! Each identity gets one counter in the shared key-value store. The first
//! request of a window creates it with the configured lifetime; the store
//! expires it, which starts the next window.
//!
//! Identity:
//! - bearer-authenticated requests use a valid `X-Client-IP` hint, else the
//!   token id;
//! - everything else uses the peer address (`"unknown"` without one).
//!
//! Every limited response carries `X-RateLimit-Limit`,
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset` (Unix epoch seconds).

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use keygate_auth::middleware::AuthenticatedToken;
use keygate_cache::{CacheError, DynKeyValueStore};
use serde_json::json;
use time::OffsetDateTime;

use crate::config::RateLimitConfig;
use crate::metrics;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
pub const X_CLIENT_IP: HeaderName = HeaderName::from_static("x-client-ip");

const KEY_PREFIX: &str = "ratelimit:";

/// Ceiling tier of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Anonymous,
    Authenticated,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticated => "authenticated",
        }
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub limit: u64,
    pub remaining: u64,
    /// Window end as Unix epoch seconds.
    pub reset: i64,
    pub allowed: bool,
}

impl RateDecision {
    fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset));
    }
}

/// Errors from the rate limiter.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The caller exceeded its ceiling for the current window.
    #[error("Rate limit exceeded for {identity}")]
    Exceeded {
        identity: String,
        decision: RateDecision,
    },

    /// The shared store could not count the request.
    #[error("Rate limit store error: {0}")]
    Store(#[from] CacheError),
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        match self {
            Self::Exceeded { decision, .. } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({
                        "error": "rate_limit_exceeded",
                        "message": "Rate limit exceeded",
                    })),
                )
                    .into_response();
                decision.apply_headers(response.headers_mut());
                response
            }
            Self::Store(err) => {
                tracing::error!(error = %err, "rate limit check failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "server_error",
                        "message": "Internal server error",
                    })),
                )
                    .into_response()
            }
        }
    }
}

/// Counts requests per identity against tiered ceilings.
pub struct RateLimiter {
    store: DynKeyValueStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: DynKeyValueStore, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn ceiling(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Anonymous => self.config.anonymous,
            Tier::Authenticated => self.config.authenticated,
        }
    }

    /// Counts one request for `identity` and decides whether it may proceed.
    pub async fn check(&self, identity: &str, tier: Tier) -> Result<RateDecision, RateLimitError> {
        let key = format!("{KEY_PREFIX}{identity}");
        let window = self.store.incr_window(&key, self.config.window()).await?;
        let limit = self.ceiling(tier);

        let reset_in = window.reset_in.as_secs_f64().ceil() as i64;
        let decision = RateDecision {
            limit,
            remaining: limit.saturating_sub(window.count),
            reset: OffsetDateTime::now_utc().unix_timestamp() + reset_in,
            allowed: window.count <= limit,
        };

        if !decision.allowed {
            metrics::record_rate_limit_rejection(tier.as_str());
            tracing::info!(%identity, tier = tier.as_str(), count = window.count, "rate limit exceeded");
            return Err(RateLimitError::Exceeded {
                identity: identity.to_string(),
                decision,
            });
        }
        Ok(decision)
    }
}

/// Resolves the rate-limit identity and tier of a request.
pub fn identify(request: &Request) -> (String, Tier) {
    if let Some(AuthenticatedToken(token)) = request.extensions().get::<AuthenticatedToken>() {
        let hinted = request
            .headers()
            .get(X_CLIENT_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        let identity = match hinted {
            Some(ip) => ip.to_string(),
            None => token.id.to_string(),
        };
        return (identity, Tier::Authenticated);
    }

    let identity = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    (identity, Tier::Anonymous)
}

/// Rate limiting middleware. Must run inside the authentication gate.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.config.enabled {
        return next.run(request).await;
    }

    let (identity, tier) = identify(&request);
    match limiter.check(&identity, tier).await {
        Ok(decision) => {
            let mut response = next.run(request).await;
            decision.apply_headers(response.headers_mut());
            response
        }
        Err(err) => err.into_response(),
    }
}
