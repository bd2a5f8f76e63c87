use keygate_cache::{LockConfig, RedisConfig};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Shared key-value store (cache records, locks, rate windows)
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Cache-fill lock timing
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if self.redis.enabled && self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        if self.lock.lease_ms == 0 {
            return Err("lock.lease_ms must be > 0".into());
        }
        if self.rate_limit.duration_ms == 0 {
            return Err("rate_limit.duration_ms must be > 0".into());
        }
        if self.rate_limit.anonymous > self.rate_limit.authenticated {
            return Err("rate_limit.anonymous must be <= rate_limit.authenticated".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_body_limit() -> usize {
    1024 * 1024
}

/// Where cached entity records live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// The shared key-value store; coherent across processes.
    #[default]
    Shared,
    /// A per-process map; no TTL, lost on restart.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Record TTL in seconds. `0` disables expiry.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub backend: CacheBackend,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            backend: CacheBackend::default(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

fn default_cache_ttl() -> u64 {
    3600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Window length in milliseconds
    #[serde(default = "default_rate_window_ms")]
    pub duration_ms: u64,
    /// Requests per window for callers without a bearer token
    #[serde(default = "default_anonymous_ceiling")]
    pub anonymous: u64,
    /// Requests per window for bearer-authenticated callers
    #[serde(default = "default_authenticated_ceiling")]
    pub authenticated: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_ms: default_rate_window_ms(),
            anonymous: default_anonymous_ceiling(),
            authenticated: default_authenticated_ceiling(),
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

fn default_true() -> bool {
    true
}
fn default_rate_window_ms() -> u64 {
    3_600_000
}
fn default_anonymous_ceiling() -> u64 {
    100
}
fn default_authenticated_ceiling() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file, relative to the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "keygate.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., KEYGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("KEYGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.cache.ttl(), Some(Duration::from_secs(3600)));
        assert_eq!(cfg.lock.lease_ms, 1000);
        assert_eq!(cfg.rate_limit.window(), Duration::from_millis(3_600_000));
        assert_eq!((cfg.rate_limit.anonymous, cfg.rate_limit.authenticated), (100, 5000));
        assert!(!cfg.redis.enabled);
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let cache = CacheConfig {
            ttl_secs: 0,
            backend: CacheBackend::Local,
        };
        assert_eq!(cache.ttl(), None);
    }

    #[test]
    fn test_validation_rejects_inverted_tiers() {
        let mut cfg = AppConfig::default();
        cfg.rate_limit.anonymous = 10_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("rate_limit.anonymous"));
    }

    #[test]
    fn test_validation_rejects_unknown_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "chatty".into();
        assert!(cfg.validate().is_err());
    }
}
