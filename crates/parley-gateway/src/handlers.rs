// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::server::GatewayState;

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when every component answers, `degraded` otherwise.
    pub status: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// KV backend reachability.
    pub kv: String,
    /// Registered game types.
    pub games: Vec<String>,
    /// Loaded workflow ids.
    pub workflows: Vec<String>,
}

/// GET /health
///
/// Pings the KV backend and reports the registered components.
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let kv = match state.kv.ping().await {
        Ok(()) => "up",
        Err(_) => "down",
    };
    Json(HealthResponse {
        status: if kv == "up" { "ok" } else { "degraded" }.to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        kv: kv.to_string(),
        games: state
            .factory
            .known_types()
            .into_iter()
            .map(str::to_string)
            .collect(),
        workflows: state.workflows.workflow_ids(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let response = HealthResponse {
            status: "ok".into(),
            uptime_secs: 12,
            kv: "up".into(),
            games: vec!["turtle_soup".into()],
            workflows: vec![],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["kv"], "up");
        assert_eq!(json["games"][0], "turtle_soup");
    }
}
