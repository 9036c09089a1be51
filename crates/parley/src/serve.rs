// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley serve` command implementation.
//!
//! Wires the KV backend, SQLite fallback, config catalog, adapter
//! factory, game runtimes, workflow engine, and gateway together, then
//! serves until Ctrl-C.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parley_catalog::{CacheFlags, CatalogManager};
use parley_config::ParleyConfig;
use parley_core::traits::{ConfigSource, KvStore};
use parley_core::ParleyError;
use parley_game::{GameFactory, GameSettings};
use parley_gateway::GatewayState;
use parley_hub::Hub;
use parley_kv::{MemoryStore, RedisSettings, RedisStore};
use parley_llm::AdapterFactory;
use parley_session::SessionStore;
use parley_storage::SqliteStore;
use parley_tools::ToolRegistry;
use parley_usage::UsageSink;
use parley_workflow::{NodeServices, WorkflowLibrary, WorkflowService};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Runs the `parley serve` command.
///
/// Builds every component bottom-up and blocks on the gateway until a
/// shutdown signal arrives.
pub async fn run_serve(config: ParleyConfig) -> Result<(), ParleyError> {
    init_tracing(&config.server.log_level);

    info!("starting parley serve");

    // KV backend: Redis in production, in-memory for local development.
    let kv: Arc<dyn KvStore> = if config.redis.enabled {
        let settings = RedisSettings {
            host: config.redis.host.clone(),
            port: config.redis.port,
            db: config.redis.db,
            password: config.redis.password.clone(),
            response_timeout: Duration::from_secs(config.redis.response_timeout_secs),
            max_connections: config.redis.max_connections,
            ..RedisSettings::default()
        };
        Arc::new(RedisStore::connect(&settings).await?)
    } else {
        warn!("redis disabled, using the in-memory KV store");
        Arc::new(MemoryStore::new())
    };
    // Unreachable KV at startup is fatal; main turns this into exit 1.
    kv.ping().await?;

    let storage = Arc::new(SqliteStore::open(&config.storage.database_path).await?);

    let catalog = Arc::new(CatalogManager::new(
        Arc::clone(&kv),
        &config.redis.prefix,
        Arc::clone(&storage) as Arc<dyn ConfigSource>,
        catalog_flags(&config),
    ));
    if let Err(error) = catalog.refresh_all().await {
        warn!(%error, "catalog warm-up failed, caches will fill lazily");
    }

    let adapters = Arc::new(AdapterFactory::new(
        Arc::clone(&catalog),
        Arc::clone(&storage) as Arc<dyn UsageSink>,
    ));

    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(parley_game::CreateSoupTool));
    tools.register(Arc::new(parley_game::JudgeAnswerTool));
    let tools = Arc::new(tools);

    let hub = Arc::new(Hub::new(Arc::clone(&kv)));
    let sessions = Arc::new(SessionStore::new(
        Arc::clone(&kv),
        Duration::from_secs(config.session.ttl_secs),
        Duration::from_secs(config.session.max_idle_secs),
    ));
    let cleanup_task = Arc::clone(&sessions)
        .start_cleanup(Duration::from_secs(config.session.cleanup_interval_secs));

    let settings = GameSettings {
        default_model_id: config.game.default_model_id.clone(),
        setter_model_id: config.game.setter_model_id.clone(),
        default_player_count: config.game.default_player_count,
    };
    let factory = Arc::new(GameFactory::with_defaults());

    let library = match WorkflowLibrary::load_dir(&config.workflow.templates_dir).await {
        Ok(library) => {
            info!(
                dir = %config.workflow.templates_dir,
                workflows = library.len(),
                "workflow templates loaded"
            );
            library
        }
        Err(error) => {
            warn!(
                dir = %config.workflow.templates_dir,
                %error,
                "workflow templates unavailable, serving games only"
            );
            WorkflowLibrary::empty()
        }
    };
    let workflows = Arc::new(WorkflowService::new(
        library,
        NodeServices {
            catalog: Arc::clone(&catalog),
            adapters: Arc::clone(&adapters),
            tools: Arc::clone(&tools),
            default_model_id: config.game.default_model_id.clone(),
        },
        Arc::clone(&sessions),
    ));

    let state = GatewayState {
        factory,
        hub,
        sessions,
        catalog,
        adapters,
        workflows,
        kv,
        settings,
        start_time: Instant::now(),
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    let result = parley_gateway::start_server(&config.server, state, shutdown).await;

    cleanup_task.abort();
    info!("parley serve stopped");
    result
}

fn catalog_flags(config: &ParleyConfig) -> CacheFlags {
    CacheFlags {
        providers: config.cache.providers,
        models: config.cache.models,
        prompts: config.cache.prompts,
        roles: config.cache.roles,
        system: config.cache.system,
    }
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("parley={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
