use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use keygate_auth::Credentials;
use keygate_auth::middleware::{AuthState, BearerAuth, ClientAuth, authenticate};
use keygate_cache::{
    DistributedLock, DynKeyValueStore, DynRecordCache, LocalCache, SharedCache, create_kv_store,
};
use keygate_storage::MemoryEntityStore;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, CacheBackend};
use crate::metrics;
use crate::ratelimit::{RateLimiter, rate_limit};

/// Shared components, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub kv: DynKeyValueStore,
    pub credentials: Arc<Credentials>,
    pub limiter: Arc<RateLimiter>,
}

/// Connects the key-value store and assembles caches, hooks and the limiter.
///
/// Entity rows live in the in-process entity store.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    cfg.validate().map_err(anyhow::Error::msg)?;

    let kv = create_kv_store(&cfg.redis).await;
    let lock = DistributedLock::new(kv.clone(), cfg.lock.clone());
    let records: DynRecordCache = match cfg.cache.backend {
        CacheBackend::Shared => Arc::new(SharedCache::new(kv.clone(), cfg.cache.ttl())),
        CacheBackend::Local => Arc::new(LocalCache::new()),
    };
    tracing::info!(
        kv = kv.backend_name(),
        records = records.name(),
        ttl_secs = cfg.cache.ttl_secs,
        "cache backend selected"
    );

    let credentials = Credentials::assemble(
        Arc::new(MemoryEntityStore::new()),
        Arc::new(MemoryEntityStore::new()),
        records,
        lock,
    );
    let limiter = RateLimiter::new(kv.clone(), cfg.rate_limit.clone());

    Ok(AppState {
        config: Arc::new(cfg.clone()),
        kv,
        credentials: Arc::new(credentials),
        limiter: Arc::new(limiter),
    })
}

pub fn build_app(state: &AppState) -> Router {
    let auth_state = AuthState::new(
        state.credentials.clone(),
        state.config.server.body_limit_bytes,
    );

    Router::new()
        .route("/", get(root))
        .route("/me", get(me))
        .route("/oauth/client", get(oauth_client))
        // Request order: auth gate -> rate limit -> handler
        .layer(middleware::from_fn_with_state(state.limiter.clone(), rate_limit))
        .layer(middleware::from_fn_with_state(auth_state, authenticate))
        .route("/metrics", get(metrics_endpoint))
        .fallback(not_found)
        .layer(middleware::from_fn(default_cache_control))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = tracing::field::Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            state.config.server.body_limit_bytes,
        ))
}

async fn root() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn me(BearerAuth(token): BearerAuth) -> Json<Value> {
    Json(json!({
        "id": token.id,
        "scopes": token.scopes,
        "application_id": token.application_id,
        "member_id": token.member_id,
    }))
}

async fn oauth_client(ClientAuth(application): ClientAuth) -> Json<Value> {
    Json(json!({
        "id": application.id,
        "name": application.name,
        "scopes": application.scopes,
        "redirect_uri": application.redirect_uri,
    }))
}

async fn metrics_endpoint() -> Response {
    match metrics::render_metrics() {
        Some(body) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )],
            body,
        )
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not_found", "message": "Not found" })),
    )
}

/// Marks responses `Cache-Control: private` unless a handler chose otherwise.
async fn default_cache_control(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response
        .headers_mut()
        .entry(header::CACHE_CONTROL)
        .or_insert(HeaderValue::from_static("private"));
    response
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<KeygateServer> {
        metrics::init_metrics();
        let state = build_state(&self.config).await?;
        let app = build_app(&state);

        Ok(KeygateServer {
            addr: self.addr,
            app,
            state,
        })
    }
}

pub struct KeygateServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

impl KeygateServer {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
