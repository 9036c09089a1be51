// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket gateway for the Parley game server.
//!
//! Serves `/ws/game/{game_type}` for runtime-driven games,
//! `/ws/workflow` for template-driven workflow sessions, and a
//! JSON `/health` endpoint.

pub mod game_ws;
pub mod handlers;
pub mod server;
pub mod workflow_ws;

pub use server::{build_router, start_server, GatewayState};
