// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Game runtimes and the connection driver.
//!
//! A [`GameRuntime`] owns one session's agents and state; the
//! [`GameFactory`] builds one per connection from the `game_type` path
//! segment, and [`play_game`] sequences turns between the human and the
//! AI players until the game ends or the client disconnects.

pub mod agent;
pub mod runtime;
pub mod tools;
pub mod turtle_soup;

pub use agent::{decode_agents, snapshot_agents, AgentState, GameAgent};
pub use runtime::{
    play_game, ClientCommand, GameContext, GameFactory, GameRuntime, GameSettings,
};
pub use tools::{CreateSoupTool, JudgeAnswerTool};
pub use turtle_soup::TurtleSoupGame;
