use std::{env, fs};

use keygate_server::config::CacheBackend;
use keygate_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("keygate.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081

[redis]
enabled = false
url = "redis://cache:6379"

[cache]
ttl_secs = 0
backend = "local"

[lock]
lease_ms = 250

[rate_limit]
duration_ms = 60000
anonymous = 10
authenticated = 20

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.redis.url, "redis://cache:6379");
    assert_eq!(cfg.cache.backend, CacheBackend::Local);
    assert_eq!(cfg.cache.ttl(), None);
    assert_eq!(cfg.lock.lease_ms, 250);
    assert_eq!(cfg.lock.retry_count, 10);
    assert_eq!(cfg.rate_limit.anonymous, 10);
    assert_eq!(cfg.logging.level, "debug");

    // 2) Env override should win over file
    unsafe {
        env::set_var("KEYGATE__RATE_LIMIT__AUTHENTICATED", "40");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.rate_limit.authenticated, 40);
    unsafe {
        env::remove_var("KEYGATE__RATE_LIMIT__AUTHENTICATED");
    }

    // 3) Invalid config (anonymous > authenticated) should error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[rate_limit]
anonymous = 50
authenticated = 10
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("rate_limit.anonymous"));
}
