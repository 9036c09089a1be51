// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use parley_catalog::CatalogManager;
use parley_config::ServerConfig;
use parley_core::traits::KvStore;
use parley_core::ParleyError;
use parley_game::{GameFactory, GameSettings};
use parley_hub::Hub;
use parley_llm::AdapterFactory;
use parley_session::SessionStore;
use parley_workflow::WorkflowService;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::{game_ws, handlers, workflow_ws};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub factory: Arc<GameFactory>,
    pub hub: Arc<Hub>,
    pub sessions: Arc<SessionStore>,
    pub catalog: Arc<CatalogManager>,
    pub adapters: Arc<AdapterFactory>,
    pub workflows: Arc<WorkflowService>,
    pub kv: Arc<dyn KvStore>,
    pub settings: GameSettings,
    /// Process start time for uptime reporting.
    pub start_time: Instant,
}

/// Build the gateway router over the shared state.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/ws/game/{game_type}", get(game_ws::ws_handler))
        .route("/ws/workflow", get(workflow_ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Start the gateway HTTP/WebSocket server.
///
/// Binds to the configured host:port and serves until the cancellation
/// token fires, then drains in-flight connections.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), ParleyError> {
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    info!(%addr, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| ParleyError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
