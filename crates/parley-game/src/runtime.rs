// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-game interface and the connection driver loop.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parley_catalog::CatalogManager;
use parley_core::{ParleyError, SessionId, TurnOutcome, TurnState};
use parley_hub::Hub;
use parley_llm::AdapterFactory;
use parley_session::SessionStore;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Game-level settings resolved from configuration.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub default_model_id: String,
    /// Model for the puzzle setter; falls back to the default model.
    pub setter_model_id: Option<String>,
    pub default_player_count: usize,
}

/// Shared handles a runtime needs to drive one session.
#[derive(Clone)]
pub struct GameContext {
    pub session_id: SessionId,
    pub sessions: Arc<SessionStore>,
    pub hub: Arc<Hub>,
    pub catalog: Arc<CatalogManager>,
    pub adapters: Arc<AdapterFactory>,
    pub settings: GameSettings,
}

/// One running game.
///
/// Implementations own their agents and session blob; the driver loop
/// only sequences turns.
#[async_trait]
pub trait GameRuntime: Send {
    fn game_type(&self) -> &str;

    /// Tries to re-attach to a persisted session. Returns `false` when
    /// nothing is stored and the caller should `initialize` instead.
    async fn attach(&mut self) -> Result<bool, ParleyError> {
        Ok(false)
    }

    /// Sets up a fresh game, or re-attaches to a persisted session.
    async fn initialize(&mut self, custom_params: Option<Value>)
        -> Result<TurnOutcome, ParleyError>;

    /// Plays one round. `Some` is a human turn, `None` an AI turn.
    async fn play_round(
        &mut self,
        human_message: Option<String>,
    ) -> Result<TurnOutcome, ParleyError>;

    /// Ends the game, revealing whatever the game reveals.
    async fn end_game(&mut self) -> Result<TurnOutcome, ParleyError>;
}

type Builder = Box<dyn Fn(GameContext) -> Box<dyn GameRuntime> + Send + Sync>;

/// Maps `game_type` strings to runtime constructors.
pub struct GameFactory {
    builders: HashMap<String, Builder>,
}

impl GameFactory {
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in games.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register("turtle_soup", |ctx| {
            Box::new(crate::turtle_soup::TurtleSoupGame::new(ctx))
        });
        factory
    }

    pub fn register<F>(&mut self, game_type: &str, builder: F)
    where
        F: Fn(GameContext) -> Box<dyn GameRuntime> + Send + Sync + 'static,
    {
        self.builders
            .insert(game_type.to_string(), Box::new(builder));
    }

    pub fn known_types(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    pub fn create(
        &self,
        game_type: &str,
        ctx: GameContext,
    ) -> Result<Box<dyn GameRuntime>, ParleyError> {
        let builder = self
            .builders
            .get(game_type)
            .ok_or_else(|| ParleyError::Game(format!("unknown game type: {game_type}")))?;
        Ok(builder(ctx))
    }
}

impl Default for GameFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Control messages from the client connection.
#[derive(Debug, Clone)]
pub enum ClientCommand {
    HumanMessage(String),
    EndGame,
}

/// Drives one game over one connection until it ends or the client goes
/// away.
///
/// `resumed` tells the driver a session already exists, so it skips
/// initialization and prompts for the human turn directly. Errors
/// propagate to the connection handler, which owns the error frame; the
/// session itself survives for reconnection.
pub async fn play_game(
    runtime: &mut dyn GameRuntime,
    resumed: bool,
    custom_params: Option<Value>,
    commands: &mut mpsc::Receiver<ClientCommand>,
    status: &mpsc::UnboundedSender<TurnOutcome>,
) -> Result<(), ParleyError> {
    if resumed {
        let _ = status.send(TurnOutcome::new(TurnState::WaitingForHuman));
    } else {
        let outcome = runtime.initialize(custom_params).await?;
        let over = outcome.status == TurnState::GameOver;
        let _ = status.send(outcome);
        if over {
            return Ok(());
        }
    }

    loop {
        let Some(command) = commands.recv().await else {
            debug!(game_type = runtime.game_type(), "client went away, suspending game");
            return Ok(());
        };

        match command {
            ClientCommand::EndGame => {
                let outcome = runtime.end_game().await?;
                let _ = status.send(outcome);
                info!(game_type = runtime.game_type(), "game ended by client");
                return Ok(());
            }
            ClientCommand::HumanMessage(text) => {
                let outcome = runtime.play_round(Some(text)).await?;
                let over = outcome.status == TurnState::GameOver;
                let _ = status.send(outcome);
                if over {
                    return Ok(());
                }

                let outcome = runtime.play_round(None).await?;
                let over = outcome.status == TurnState::GameOver;
                let _ = status.send(outcome);
                if over {
                    return Ok(());
                }
                let _ = status.send(TurnOutcome::new(TurnState::WaitingForHuman));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedGame {
        rounds_until_over: u32,
        rounds_played: u32,
        ended: bool,
    }

    #[async_trait]
    impl GameRuntime for ScriptedGame {
        fn game_type(&self) -> &str {
            "scripted"
        }

        async fn initialize(
            &mut self,
            _custom_params: Option<Value>,
        ) -> Result<TurnOutcome, ParleyError> {
            Ok(TurnOutcome::new(TurnState::WaitingForHuman))
        }

        async fn play_round(
            &mut self,
            human_message: Option<String>,
        ) -> Result<TurnOutcome, ParleyError> {
            self.rounds_played += 1;
            let status = if self.rounds_played >= self.rounds_until_over {
                TurnState::GameOver
            } else if human_message.is_some() {
                TurnState::WaitingForHuman
            } else {
                TurnState::AiTurn
            };
            Ok(TurnOutcome::new(status).with_round(self.rounds_played))
        }

        async fn end_game(&mut self) -> Result<TurnOutcome, ParleyError> {
            self.ended = true;
            Ok(TurnOutcome::new(TurnState::GameOver))
        }
    }

    #[tokio::test]
    async fn human_turn_is_followed_by_ai_turn() {
        let mut game = ScriptedGame {
            rounds_until_over: 10,
            rounds_played: 0,
            ended: false,
        };
        let (cmd_tx, mut cmd_rx) = mpsc::channel(4);
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();

        cmd_tx
            .send(ClientCommand::HumanMessage("is it red?".into()))
            .await
            .unwrap();
        drop(cmd_tx);

        play_game(&mut game, false, None, &mut cmd_rx, &status_tx)
            .await
            .unwrap();

        // initialize, human round, ai round, trailing waiting_for_human
        let mut statuses = Vec::new();
        while let Ok(outcome) = status_rx.try_recv() {
            statuses.push(outcome.status);
        }
        assert_eq!(
            statuses,
            vec![
                TurnState::WaitingForHuman,
                TurnState::WaitingForHuman,
                TurnState::AiTurn,
                TurnState::WaitingForHuman,
            ]
        );
        assert_eq!(game.rounds_played, 2);
    }

    #[tokio::test]
    async fn end_game_command_stops_the_loop() {
        let mut game = ScriptedGame {
            rounds_until_over: 10,
            rounds_played: 0,
            ended: false,
        };
        let (cmd_tx, mut cmd_rx) = mpsc::channel(4);
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();

        cmd_tx.send(ClientCommand::EndGame).await.unwrap();
        play_game(&mut game, true, None, &mut cmd_rx, &status_tx)
            .await
            .unwrap();

        assert!(game.ended);
        assert_eq!(game.rounds_played, 0);
        assert_eq!(
            status_rx.try_recv().unwrap().status,
            TurnState::WaitingForHuman
        );
        assert_eq!(status_rx.try_recv().unwrap().status, TurnState::GameOver);
    }

    #[tokio::test]
    async fn game_over_mid_round_ends_the_loop() {
        let mut game = ScriptedGame {
            rounds_until_over: 1,
            rounds_played: 0,
            ended: false,
        };
        let (cmd_tx, mut cmd_rx) = mpsc::channel(4);
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();

        cmd_tx
            .send(ClientCommand::HumanMessage("the sailor ate his wife".into()))
            .await
            .unwrap();
        cmd_tx
            .send(ClientCommand::HumanMessage("never delivered".into()))
            .await
            .unwrap();

        play_game(&mut game, true, None, &mut cmd_rx, &status_tx)
            .await
            .unwrap();
        assert_eq!(game.rounds_played, 1);

        let mut last = None;
        while let Ok(outcome) = status_rx.try_recv() {
            last = Some(outcome.status);
        }
        assert_eq!(last, Some(TurnState::GameOver));
    }

    #[test]
    fn factory_rejects_unknown_game_types() {
        let factory = GameFactory::new();
        assert!(factory.known_types().is_empty());
    }
}
