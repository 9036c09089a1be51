// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./parley.toml` > `~/.config/parley/parley.toml`
//! > `/etc/parley/parley.toml` with environment variable overrides via the
//! `PARLEY_` prefix, plus the short legacy names (`APP_HOST`, `REDIS_*`)
//! existing deployments export.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ParleyConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/parley/parley.toml` (system-wide)
/// 3. `~/.config/parley/parley.toml` (user XDG config)
/// 4. `./parley.toml` (local directory)
/// 5. `PARLEY_*` environment variables
/// 6. Legacy environment names (`APP_HOST`, `APP_PORT`, `REDIS_*`, ...)
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    let mut config: ParleyConfig = Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file("/etc/parley/parley.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("parley/parley.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("parley.toml"))
        .merge(env_provider())
        .extract()?;
    apply_legacy_env(&mut config)?;
    Ok(config)
}

/// Load configuration from a TOML string only (no files, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    let mut config: ParleyConfig = Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()?;
    apply_legacy_env(&mut config)?;
    Ok(config)
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `PARLEY_REDIS_RESPONSE_TIMEOUT_SECS`
/// must map to `redis.response_timeout_secs`.
fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("server_", "server.", 1)
            .replacen("redis_", "redis.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("cache_", "cache.", 1)
            .replacen("session_", "session.", 1)
            .replacen("llm_", "llm.", 1)
            .replacen("game_", "game.", 1);
        mapped.into()
    })
}

/// Applies the short environment names the original deployments export.
pub fn apply_legacy_env(config: &mut ParleyConfig) -> Result<(), figment::Error> {
    if let Ok(host) = std::env::var("APP_HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("APP_PORT") {
        config.server.port = port
            .parse()
            .map_err(|_| figment::Error::from(format!("APP_PORT is not a port: {port}")))?;
    }
    if let Ok(host) = std::env::var("REDIS_HOST") {
        config.redis.host = host;
    }
    if let Ok(port) = std::env::var("REDIS_PORT") {
        config.redis.port = port
            .parse()
            .map_err(|_| figment::Error::from(format!("REDIS_PORT is not a port: {port}")))?;
    }
    if let Ok(db) = std::env::var("REDIS_DB") {
        config.redis.db = db
            .parse()
            .map_err(|_| figment::Error::from(format!("REDIS_DB is not a number: {db}")))?;
    }
    if let Ok(password) = std::env::var("REDIS_PASSWORD") {
        if !password.is_empty() {
            config.redis.password = Some(password);
        }
    }
    if let Ok(prefix) = std::env::var("REDIS_PREFIX") {
        config.redis.prefix = prefix;
    }
    if let Ok(max) = std::env::var("REDIS_MAX_CONNECTIONS") {
        config.redis.max_connections = max.parse().map_err(|_| {
            figment::Error::from(format!("REDIS_MAX_CONNECTIONS is not a number: {max}"))
        })?;
    }
    Ok(())
}
