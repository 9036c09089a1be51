// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley game server.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Parley configuration.
///
/// Loaded from TOML files with environment variable overrides. All
/// sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// HTTP/WebSocket server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis key-value backend settings.
    #[serde(default)]
    pub redis: RedisConfig,

    /// SQLite relational fallback settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-subsystem config-cache enable flags.
    #[serde(default)]
    pub cache: CacheFlags,

    /// Session store settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Model call settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Game runtime settings.
    #[serde(default)]
    pub game: GameConfig,

    /// Workflow engine settings.
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the server to.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Redis backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// When false the server runs on the in-memory store instead.
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub db: i64,

    #[serde(default)]
    pub password: Option<String>,

    /// Key namespace prefix. The historical spelling is load-bearing:
    /// existing deployments already hold keys under it.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Per-command timeout in seconds.
    #[serde(default = "default_redis_timeout_secs")]
    pub response_timeout_secs: u64,

    /// Cap on concurrently in-flight commands.
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            host: default_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
            prefix: default_prefix(),
            response_timeout_secs: default_redis_timeout_secs(),
            max_connections: default_redis_max_connections(),
        }
    }
}

fn default_redis_enabled() -> bool {
    true
}

fn default_redis_port() -> u16 {
    6379
}

fn default_prefix() -> String {
    "knowleadge_api:".to_string()
}

fn default_redis_timeout_secs() -> u64 {
    5
}

fn default_redis_max_connections() -> usize {
    10
}

/// SQLite relational fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Per-subsystem cache enable flags.
///
/// A disabled cache reads through to the relational source on every call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheFlags {
    #[serde(default = "enabled")]
    pub providers: bool,
    #[serde(default = "enabled")]
    pub models: bool,
    #[serde(default = "enabled")]
    pub prompts: bool,
    #[serde(default = "enabled")]
    pub roles: bool,
    #[serde(default = "enabled")]
    pub system: bool,
}

impl Default for CacheFlags {
    fn default() -> Self {
        Self {
            providers: true,
            models: true,
            prompts: true,
            roles: true,
            system: true,
        }
    }
}

fn enabled() -> bool {
    true
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Session blob time-to-live in seconds (default 7 days).
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Idle time after which cleanup deletes a session (default 24 h).
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Minimum spacing between opportunistic cleanup sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            max_idle_secs: default_max_idle_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    7 * 24 * 3600
}

fn default_max_idle_secs() -> u64 {
    24 * 3600
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

/// Model call configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Retries after a transient vendor error.
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// Output cap applied to backends that require one.
    #[serde(default = "default_llm_max_tokens")]
    pub default_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_llm_timeout_secs(),
            max_retries: default_llm_retries(),
            default_max_tokens: default_llm_max_tokens(),
        }
    }
}

fn default_llm_timeout_secs() -> u64 {
    300
}

fn default_llm_retries() -> u32 {
    1
}

fn default_llm_max_tokens() -> u32 {
    4096
}

/// Game runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GameConfig {
    /// Model used by AI players when a role does not pick its own.
    #[serde(default = "default_game_model")]
    pub default_model_id: String,

    /// Model used by the puzzle setter; falls back to `default_model_id`.
    #[serde(default)]
    pub setter_model_id: Option<String>,

    /// Total player slots offered to a new game, human included.
    #[serde(default = "default_player_count")]
    pub default_player_count: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            default_model_id: default_game_model(),
            setter_model_id: None,
            default_player_count: default_player_count(),
        }
    }
}

fn default_game_model() -> String {
    "doubao-pro-32k-241215".to_string()
}

fn default_player_count() -> usize {
    3
}

/// Workflow engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    /// Directory of workflow definition JSON files.
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
        }
    }
}

fn default_templates_dir() -> String {
    "workflows".to_string()
}
