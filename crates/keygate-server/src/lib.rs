pub mod config;
pub mod metrics;
pub mod observability;
pub mod ratelimit;
pub mod server;

pub use config::AppConfig;
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use ratelimit::{RateDecision, RateLimitError, RateLimiter, Tier};
pub use server::{AppState, KeygateServer, ServerBuilder, build_app, build_state};
