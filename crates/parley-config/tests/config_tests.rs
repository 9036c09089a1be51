// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Parley configuration system.

use parley_config::loader::apply_legacy_env;
use parley_config::{load_config_from_str, ParleyConfig};
use serial_test::serial;

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_parley_config() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 9000
log_level = "debug"

[redis]
enabled = true
host = "redis.internal"
port = 6380
db = 2
password = "hunter2"
prefix = "test:"

[storage]
database_path = "/tmp/test.db"
wal_mode = false

[cache]
prompts = false

[session]
ttl_secs = 3600
max_idle_secs = 600

[llm]
request_timeout_secs = 120
max_retries = 2

[game]
default_model_id = "gpt-4o-mini"
setter_model_id = "gpt-4o"
default_player_count = 4
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.redis.host, "redis.internal");
    assert_eq!(config.redis.db, 2);
    assert_eq!(config.redis.password.as_deref(), Some("hunter2"));
    assert_eq!(config.redis.prefix, "test:");
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert!(!config.storage.wal_mode);
    assert!(config.cache.providers);
    assert!(!config.cache.prompts);
    assert_eq!(config.session.ttl_secs, 3600);
    assert_eq!(config.llm.max_retries, 2);
    assert_eq!(config.game.setter_model_id.as_deref(), Some("gpt-4o"));
    assert_eq!(config.game.default_player_count, 4);
}

/// Defaults hold when the file is empty.
#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.redis.prefix, "knowleadge_api:");
    assert_eq!(config.session.ttl_secs, 7 * 24 * 3600);
    assert_eq!(config.session.max_idle_secs, 24 * 3600);
    assert_eq!(config.redis.max_connections, 10);
    assert_eq!(config.llm.request_timeout_secs, 300);
    assert_eq!(config.llm.default_max_tokens, 4096);
    assert!(config.cache.roles);
}

/// Unknown fields are rejected at startup.
#[test]
fn unknown_field_produces_error() {
    let toml = r#"
[redis]
hostt = "oops"
"#;
    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("hostt"),
        "error should mention the bad key, got: {err_str}"
    );
}

/// Identifiers are UUIDs, so there is no machine id to configure.
#[test]
fn machine_id_is_not_a_server_field() {
    let toml = r#"
[server]
machine_id = 3
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// Legacy env names override the parsed config.
#[test]
#[serial]
fn legacy_env_names_override() {
    let mut config = ParleyConfig::default();

    unsafe {
        std::env::set_var("APP_HOST", "10.0.0.5");
        std::env::set_var("APP_PORT", "9999");
        std::env::set_var("REDIS_HOST", "cache.internal");
        std::env::set_var("REDIS_DB", "7");
        std::env::set_var("REDIS_PREFIX", "alt:");
        std::env::set_var("REDIS_MAX_CONNECTIONS", "32");
    }
    let result = apply_legacy_env(&mut config);
    unsafe {
        std::env::remove_var("APP_HOST");
        std::env::remove_var("APP_PORT");
        std::env::remove_var("REDIS_HOST");
        std::env::remove_var("REDIS_DB");
        std::env::remove_var("REDIS_PREFIX");
        std::env::remove_var("REDIS_MAX_CONNECTIONS");
    }

    result.expect("legacy env values are well-formed");
    assert_eq!(config.server.host, "10.0.0.5");
    assert_eq!(config.server.port, 9999);
    assert_eq!(config.redis.host, "cache.internal");
    assert_eq!(config.redis.db, 7);
    assert_eq!(config.redis.prefix, "alt:");
    assert_eq!(config.redis.max_connections, 32);
}

/// Malformed legacy numeric values fail loudly instead of being dropped.
#[test]
#[serial]
fn malformed_legacy_port_is_an_error() {
    let mut config = ParleyConfig::default();
    unsafe {
        std::env::set_var("APP_PORT", "not-a-port");
    }
    let result = apply_legacy_env(&mut config);
    unsafe {
        std::env::remove_var("APP_PORT");
    }
    assert!(result.is_err());
}
