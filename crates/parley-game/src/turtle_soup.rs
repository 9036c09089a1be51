// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The turtle-soup lateral-thinking game.
//!
//! One randomly chosen agent sets a puzzle (a surface story plus a
//! hidden truth) and judges every question against it with the
//! `function_judge_answer` tool. The remaining agents play alongside the
//! human, probing the truth one question per round. Sessions and agent
//! memories persist through the session store, so a game survives
//! disconnects and process restarts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use parley_core::chat::{ChatMessage, ChatResponse, ToolCall};
use parley_core::records::RoleRecord;
use parley_core::types::{GameMessage, MessageUsage, TurnOutcome, TurnState};
use parley_core::ParleyError;
use parley_session::{AgentSnapshot, GameSession};
use parley_tools::ToolRegistry;

use crate::agent::{decode_agents, AgentState, GameAgent};
use crate::runtime::{GameContext, GameRuntime};
use crate::tools::{CreateSoupTool, JudgeAnswerTool, JudgeArgs, SoupArgs};

pub const GAME_TYPE: &str = "turtle_soup";

const SETTER_IDENTITY: &str = "setter";
const PLAYER_IDENTITY: &str = "player";

const JUDGE_PROMPT_ID: &str = "game_turtle_soup_judge";
const PLAYER_PROMPT_ID: &str = "game_turtle_soup";
const END_PROMPT_ID: &str = "game_turtle_soup_end";
const SET_QUESTION_PROMPT_ID: &str = "game_turtle_soup_set_question";

const TOOL_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);
const CHAT_TEMPERATURE: f32 = 0.7;
const REVEAL_TEMPERATURE: f32 = 0.8;

const CREATE_SOUP_INSTRUCTION: &str = "Help me create a turtle soup puzzle following \
the rules of the game. You must call the create_soup tool to store the puzzle. Do not \
reply to me directly.";

const FALLBACK_JUDGE_PROMPT: &str = "You are the setter of a turtle soup puzzle. The \
surface shown to the players is: {soup}\nThe hidden truth is: {answer}\nPlayers probe \
the truth with yes/no questions. Judge every question with the function_judge_answer \
tool: answer yes, no, or irrelevant, and set is_solved to 1 only when a player states \
the real truth. Never reveal the truth yourself.";

const FALLBACK_PLAYER_PROMPT: &str = "You are a player in a turtle soup game. The \
puzzle surface is: {soup}\nAsk one short yes/no question at a time that probes the \
hidden truth behind the surface. Build on what other players have learned. Never ask \
for the answer directly.";

const FALLBACK_END_PROMPT: &str = "The turtle soup game is over. The surface was: \
{soup}\nThe hidden truth is: {answer}\nSetting: {description}\nThe questions asked \
during the game were:\n{content}\nReveal the full truth and briefly explain how the \
clues fit together.";

const FALLBACK_SET_QUESTION_PROMPT: &str = "Create a {question_type} turtle soup \
puzzle. Setting: {setting}\n{description}\nThe surface must be a short, strange story \
and the answer the complete hidden truth that explains it.";

const SOLVED_ANNOUNCEMENT: &str = "恭喜玩家解谜成功！";
const GAME_START_ANNOUNCEMENT: &str = "海龟汤游戏开始！玩家们将出题并通过提问解谜。";
const GAME_OVER_ANNOUNCEMENT: &str = "游戏结束！感谢参与！";
const JUDGE_FALLBACK_REPLY: &str = "I need more information to make a judgment.";

/// Client-supplied parameters for a fresh game.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GameParams {
    /// Explicit role ids; when absent roles are drawn at random.
    roles: Option<Vec<String>>,
    /// Number of AI players (the setter comes on top).
    player_count: Option<usize>,
    /// Opaque client data, echoed back and readable by prompts.
    user_info: Option<Value>,
    /// Pre-made puzzle; skips generation entirely.
    puzzle: Option<CustomPuzzle>,
}

#[derive(Debug, Clone, Deserialize)]
struct CustomPuzzle {
    surface: String,
    truth: String,
}

/// The setter's verdict on one player message.
struct JudgeOutcome {
    solved: bool,
    answer: String,
    usage: Option<MessageUsage>,
}

pub struct TurtleSoupGame {
    ctx: GameContext,
    session: Option<GameSession>,
    setter: Option<GameAgent>,
    players: Vec<GameAgent>,
    registry: ToolRegistry,
}

impl TurtleSoupGame {
    pub fn new(ctx: GameContext) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CreateSoupTool));
        registry.register(Arc::new(JudgeAnswerTool));
        TurtleSoupGame {
            ctx,
            session: None,
            setter: None,
            players: Vec::new(),
            registry,
        }
    }

    fn session_mut(&mut self) -> Result<&mut GameSession, ParleyError> {
        self.session
            .as_mut()
            .ok_or_else(|| ParleyError::Game("no active session".into()))
    }

    fn setter_ref(&self) -> Result<&GameAgent, ParleyError> {
        self.setter
            .as_ref()
            .ok_or_else(|| ParleyError::Game("no setter agent".into()))
    }

    fn setter_mut(&mut self) -> Result<&mut GameAgent, ParleyError> {
        self.setter
            .as_mut()
            .ok_or_else(|| ParleyError::Game("no setter agent".into()))
    }

    fn state_bool(&self, key: &str) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.state_value(key))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn state_string(&self, key: &str) -> String {
        self.session
            .as_ref()
            .and_then(|s| s.state_value(key))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Catalog prompt for a role id, falling back to the built-in text.
    async fn prompt_text(&self, prompt_id: &str, fallback: &str) -> String {
        match self.ctx.catalog.prompts.get_nearest(prompt_id, f64::MAX).await {
            Ok(Some(prompt)) => prompt.prompt_text,
            Ok(None) => fallback.to_string(),
            Err(error) => {
                warn!(prompt_id, %error, "prompt lookup failed, using built-in text");
                fallback.to_string()
            }
        }
    }

    /// Appends to the transcript and fans out to attached clients.
    fn emit(&mut self, message: GameMessage) {
        if let Some(session) = self.session.as_mut() {
            session.push_message(message.clone());
        }
        self.ctx.hub.broadcast(&self.ctx.session_id, message);
    }

    fn emit_plain(&mut self, role: &str, content: &str) {
        let message = GameMessage::new(&self.ctx.session_id, role, content);
        self.emit(message);
    }

    fn agent_message(
        &self,
        agent: &GameAgent,
        role: &str,
        content: &str,
        usage: Option<MessageUsage>,
    ) -> GameMessage {
        let mut message = GameMessage::new(&self.ctx.session_id, role, content);
        message.agent_id = Some(agent.agent_id.clone());
        message.role_info = serde_json::to_value(&agent.role).ok();
        message.usage = usage;
        message
    }

    fn emit_setter(
        &mut self,
        content: &str,
        usage: Option<MessageUsage>,
    ) -> Result<(), ParleyError> {
        let message = {
            let setter = self.setter_ref()?;
            self.agent_message(setter, SETTER_IDENTITY, content, usage)
        };
        self.emit(message);
        Ok(())
    }

    /// Drops a line into every player memory except the excluded asker.
    fn relay_to_players(&mut self, content: &str, exclude: Option<&str>) {
        for player in &mut self.players {
            if exclude.is_some_and(|id| id == player.agent_id) {
                continue;
            }
            player.add_memory("user", content);
        }
    }

    fn record_usage(&mut self, agent_id: &str, usage: &MessageUsage) {
        if let Some(session) = self.session.as_mut() {
            session.usage.add(agent_id, usage);
        }
    }

    /// Snapshots all agents into the session and saves it.
    async fn save_state(&mut self) -> Result<(), ParleyError> {
        let mut states: Vec<AgentState> = Vec::new();
        if let Some(setter) = &self.setter {
            states.push(setter.snapshot());
        }
        states.extend(self.players.iter().map(GameAgent::snapshot));
        let data = serde_json::to_value(states)?;

        let session = self
            .session
            .as_mut()
            .ok_or_else(|| ParleyError::Game("no active session".into()))?;
        session.serialized_agents = Some(AgentSnapshot::new(data));
        self.ctx.sessions.save(session).await
    }

    async fn resolve_roles(&self, params: &GameParams) -> Result<Vec<RoleRecord>, ParleyError> {
        let roles = match &params.roles {
            Some(ids) if !ids.is_empty() => {
                let mut roles = Vec::with_capacity(ids.len());
                for id in ids {
                    match self.ctx.catalog.roles.get(id).await? {
                        Some(role) => roles.push(role),
                        None => warn!(role_id = %id, "unknown role requested, skipping"),
                    }
                }
                roles
            }
            _ => {
                let players = params
                    .player_count
                    .unwrap_or(self.ctx.settings.default_player_count);
                // One extra role for the setter.
                self.ctx.catalog.roles.random_roles(players + 1).await?
            }
        };
        if roles.len() < 2 {
            return Err(ParleyError::Game(
                "turtle soup needs a setter and at least one player".into(),
            ));
        }
        Ok(roles)
    }

    async fn build_agents(&mut self, roles: Vec<RoleRecord>) -> Result<(), ParleyError> {
        let setter_index = rand::thread_rng().gen_range(0..roles.len());
        let defaults = self.ctx.settings.clone();

        for (index, role) in roles.into_iter().enumerate() {
            let (identity, model_id) = if index == setter_index {
                let model = defaults
                    .setter_model_id
                    .clone()
                    .unwrap_or_else(|| defaults.default_model_id.clone());
                (SETTER_IDENTITY, model)
            } else {
                let model = role
                    .model_id
                    .clone()
                    .unwrap_or_else(|| defaults.default_model_id.clone());
                (PLAYER_IDENTITY, model)
            };
            let provider = self
                .ctx
                .adapters
                .provider_for_model(&model_id)
                .await?
                .for_session(self.ctx.session_id.as_str());
            let agent = GameAgent::new(identity, role, model_id, provider);
            if identity == SETTER_IDENTITY {
                self.setter = Some(agent);
            } else {
                self.players.push(agent);
            }
        }
        Ok(())
    }

    /// Produces the puzzle, either from the client's custom pair or by
    /// asking the setter to call `create_soup`. Empty tool results retry
    /// with a pause in between.
    async fn create_puzzle(
        &mut self,
        custom: Option<CustomPuzzle>,
        user_info: &Value,
    ) -> Result<(String, String, Option<MessageUsage>), ParleyError> {
        if let Some(puzzle) = custom {
            return Ok((puzzle.surface, puzzle.truth, None));
        }

        let question_type = user_info
            .get("question_type")
            .and_then(Value::as_str)
            .unwrap_or("simple");
        let setter_role = self.setter_ref()?.role.clone();
        let template = self
            .prompt_text(SET_QUESTION_PROMPT_ID, FALLBACK_SET_QUESTION_PROMPT)
            .await;
        let setting = setter_role.setting.clone().unwrap_or_default();
        let rendered = render(
            &template,
            &[
                ("description", &setting),
                ("setting", &setting),
                ("question_type", question_type),
            ],
        );
        let system = format!("{CREATE_SOUP_INSTRUCTION}\n{rendered}");
        let specs = self.registry.specs_for(&["create_soup"]);

        for attempt in 0..TOOL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY).await;
            }
            let response = self
                .setter_ref()?
                .function_call_messages(
                    vec![ChatMessage::system(system.clone())],
                    &specs,
                    CHAT_TEMPERATURE,
                )
                .await?;
            let usage = usage_of(&response);
            if let Some(call) = response.tool_calls.first() {
                match serde_json::from_str::<SoupArgs>(&call.arguments) {
                    Ok(args) => {
                        let setter_id = self.setter_ref()?.agent_id.clone();
                        self.record_usage(&setter_id, &usage);
                        return Ok((args.soup, args.answer, Some(usage)));
                    }
                    Err(error) => {
                        warn!(%error, "create_soup arguments failed to parse");
                    }
                }
            }
            debug!(attempt = attempt + 1, "create_soup returned no tool call, retrying");
        }
        Err(ParleyError::Game(
            "puzzle creation returned no usable tool call".into(),
        ))
    }

    /// Judges one player message against the hidden truth.
    ///
    /// The last user message is rewritten with explicit tool-call
    /// guidance before the request. Empty tool results retry with a
    /// sharper nudge in the setter's memory; a prose reply is accepted
    /// as a plain (unsolved) answer.
    async fn judge(&mut self, question: &str) -> Result<JudgeOutcome, ParleyError> {
        let specs = self.registry.specs_for(&["function_judge_answer"]);
        let setter_id = self.setter_ref()?.agent_id.clone();

        for attempt in 0..TOOL_ATTEMPTS {
            if attempt > 0 {
                let nudge = format!(
                    "You must analyze \"{question}\" with the function_judge_answer \
                     tool. Calling the tool is required, a direct reply is not accepted."
                );
                self.setter_mut()?.add_memory("user", nudge);
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let messages = {
                let mut messages = self.setter_ref()?.memory.clone();
                if let Some(last) = messages.last_mut() {
                    if last.role == "user" {
                        last.content = format!(
                            "Decide whether this player message matches the hidden \
                             truth of the puzzle, then call function_judge_answer with \
                             the verdict instead of replying directly. Player message: \
                             {content}",
                            content = last.content
                        );
                    }
                }
                messages
            };

            let response = self
                .setter_ref()?
                .function_call_messages(messages, &specs, CHAT_TEMPERATURE)
                .await?;
            let usage = usage_of(&response);
            self.record_usage(&setter_id, &usage);

            if let Some(call) = response.tool_calls.first().cloned() {
                let args: JudgeArgs = match serde_json::from_str(&call.arguments) {
                    Ok(args) => args,
                    Err(error) => {
                        warn!(%error, "judge arguments failed to parse, retrying");
                        continue;
                    }
                };

                // Keep the worked exchange in memory so later judgments
                // stay on the tool path.
                let mut assistant = ChatMessage::assistant(response.content.clone());
                assistant.tool_calls = response.tool_calls.clone();
                let mut tool_reply = ChatMessage::plain(
                    "tool",
                    format!("is_solved={} answer={}", args.is_solved, args.answer),
                );
                tool_reply.tool_call_id = Some(call.id.clone());
                let setter = self.setter_mut()?;
                setter.add_message(assistant);
                setter.add_message(tool_reply);

                return Ok(JudgeOutcome {
                    solved: args.is_solved == 1,
                    answer: args.answer,
                    usage: Some(usage),
                });
            }

            if !response.content.trim().is_empty() {
                self.setter_mut()?.add_memory("assistant", response.content.clone());
                return Ok(JudgeOutcome {
                    solved: false,
                    answer: response.content,
                    usage: Some(usage),
                });
            }
            debug!(attempt = attempt + 1, "judge returned no tool call, retrying");
        }

        self.setter_mut()?.add_memory("assistant", JUDGE_FALLBACK_REPLY);
        Ok(JudgeOutcome {
            solved: false,
            answer: JUDGE_FALLBACK_REPLY.to_string(),
            usage: None,
        })
    }

    async fn human_turn(&mut self, text: String) -> Result<TurnOutcome, ParleyError> {
        let trimmed = text.trim().to_string();
        if trimmed.eq_ignore_ascii_case("end game") || trimmed == "/end" {
            return self.end_game().await;
        }

        self.setter_mut()?
            .add_memory("user", format!("human player: {trimmed}"));
        self.session_mut()?
            .set_state("human_has_answered", json!(true));

        let verdict = self.judge(&trimmed).await?;
        if verdict.solved {
            self.emit_setter(SOLVED_ANNOUNCEMENT, verdict.usage)?;
            return self.end_game().await;
        }

        self.emit_setter(&verdict.answer, verdict.usage)?;
        self.relay_to_players(
            &format!(
                "其他玩家的提问：{trimmed},出题者对提问的回答：{answer}",
                answer = verdict.answer
            ),
            None,
        );

        let round = {
            let session = self.session_mut()?;
            session.current_round += 1;
            session.set_state("current_round", json!(session.current_round));
            session.current_round
        };
        self.save_state().await?;

        Ok(TurnOutcome::new(TurnState::AiTurn)
            .with_message("AI player turn begins")
            .with_round(round))
    }

    async fn ai_turn(&mut self) -> Result<TurnOutcome, ParleyError> {
        let round = {
            let session = self.session_mut()?;
            session.current_round = if session.current_round == 0 {
                1
            } else {
                session.current_round + 1
            };
            session.set_state("current_round", json!(session.current_round));
            session.current_round
        };

        for index in 0..self.players.len() {
            let response = self.players[index].chat(CHAT_TEMPERATURE).await?;
            let question = response.content.clone();
            let usage = usage_of(&response);
            let agent_id = self.players[index].agent_id.clone();
            let name = self.players[index].name().to_string();

            self.record_usage(&agent_id, &usage);
            let message = self.agent_message(
                &self.players[index],
                PLAYER_IDENTITY,
                &question,
                Some(usage),
            );
            self.emit(message);

            self.setter_mut()?
                .add_memory("user", format!("{name}: {question}"));

            let verdict = self.judge(&question).await?;
            if verdict.solved {
                let session = self.session_mut()?;
                let mut solved = session
                    .state_value("solved_players")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                solved.push(json!(agent_id));
                session.set_state("solved_players", Value::Array(solved));

                self.emit_setter(SOLVED_ANNOUNCEMENT, verdict.usage)?;
                return self.end_game().await;
            }

            self.emit_setter(&verdict.answer, verdict.usage)?;
            self.relay_to_players(
                &format!(
                    "{name}：{question},汤主回答了{name}：{answer}",
                    answer = verdict.answer
                ),
                Some(&agent_id),
            );
            self.players[index].add_memory(
                "user",
                format!("The setter replied: {answer}", answer = verdict.answer),
            );
        }

        self.save_state().await?;

        Ok(TurnOutcome::new(TurnState::WaitingForHuman)
            .with_message("AI player turn ends, waiting for the human player")
            .with_round(round))
    }
}

#[async_trait]
impl GameRuntime for TurtleSoupGame {
    fn game_type(&self) -> &str {
        GAME_TYPE
    }

    async fn attach(&mut self) -> Result<bool, ParleyError> {
        let Some(session) = self
            .ctx
            .sessions
            .load(GAME_TYPE, &self.ctx.session_id)
            .await?
        else {
            return Ok(false);
        };

        if let Some(snapshot) = session.serialized_agents.as_ref() {
            let states = decode_agents(&snapshot.agents_data)?;
            self.setter = None;
            self.players.clear();
            for state in states {
                let provider = self
                    .ctx
                    .adapters
                    .provider_for_model(&state.model_id)
                    .await?
                    .for_session(self.ctx.session_id.as_str());
                let agent = GameAgent::restore(state, provider);
                if agent.identity == SETTER_IDENTITY {
                    self.setter = Some(agent);
                } else {
                    self.players.push(agent);
                }
            }
        }

        info!(
            session_id = %self.ctx.session_id,
            players = self.players.len(),
            "re-attached to persisted game"
        );
        self.session = Some(session);
        Ok(true)
    }

    async fn initialize(
        &mut self,
        custom_params: Option<Value>,
    ) -> Result<TurnOutcome, ParleyError> {
        let params: GameParams = match custom_params {
            Some(value) => serde_json::from_value(value)?,
            None => GameParams::default(),
        };
        let user_info = params.user_info.clone().unwrap_or(Value::Null);

        let roles = self.resolve_roles(&params).await?;
        self.build_agents(roles).await?;

        let mut session = GameSession::new(&self.ctx.session_id, GAME_TYPE);
        session.user_data = params.user_info.clone();
        self.session = Some(session);

        self.emit_plain("system", GAME_START_ANNOUNCEMENT);

        let (surface, truth, usage) =
            self.create_puzzle(params.puzzle.clone(), &user_info).await?;

        let judge_template = self.prompt_text(JUDGE_PROMPT_ID, FALLBACK_JUDGE_PROMPT).await;
        let judge_prompt = render(&judge_template, &[("soup", &surface), ("answer", &truth)]);
        {
            let setter = self.setter_mut()?;
            setter.set_system(judge_prompt);
            // A worked example keeps the model on the tool path.
            let mut example = ChatMessage::assistant("");
            example.tool_calls = vec![ToolCall {
                id: "call_example".into(),
                name: "function_judge_answer".into(),
                arguments: json!({"answer": "no.", "is_solved": 0}).to_string(),
            }];
            setter.add_message(example);
            let mut example_reply = ChatMessage::plain("tool", "is_solved=0 answer=no.");
            example_reply.tool_call_id = Some("call_example".into());
            setter.add_message(example_reply);
        }

        let announcement = format!("我已经准备好了一个谜题，汤面是：{surface}");
        self.emit_setter(&announcement, usage)?;

        let player_template = self
            .prompt_text(PLAYER_PROMPT_ID, FALLBACK_PLAYER_PROMPT)
            .await;
        let player_prompt = render(&player_template, &[("soup", &surface)]);
        for player in &mut self.players {
            player.set_system(player_prompt.clone());
        }

        {
            let session = self.session_mut()?;
            session.set_state("current_round", json!(0));
            session.set_state("solved_players", json!([]));
            session.set_state("human_has_answered", json!(false));
            session.set_state("is_game_over", json!(false));
            session.set_state("user_info", user_info);
            session.set_state("soup_surface", json!(surface));
            session.set_state("soup_truth", json!(truth));
        }
        self.save_state().await?;

        info!(
            session_id = %self.ctx.session_id,
            players = self.players.len(),
            "turtle soup initialized"
        );

        // The AI players open the game.
        self.play_round(None).await
    }

    async fn play_round(
        &mut self,
        human_message: Option<String>,
    ) -> Result<TurnOutcome, ParleyError> {
        if self.session.is_none() {
            return Err(ParleyError::Game("no active session".into()));
        }
        if self.state_bool("is_game_over") {
            return self.end_game().await;
        }

        match human_message {
            Some(text) => self.human_turn(text).await,
            None => self.ai_turn().await,
        }
    }

    async fn end_game(&mut self) -> Result<TurnOutcome, ParleyError> {
        let surface = self.state_string("soup_surface");
        let truth = self.state_string("soup_truth");
        {
            let session = self.session_mut()?;
            session.set_state("is_game_over", json!(true));
            session.status = TurnState::GameOver;
        }

        let asked: String = self
            .setter_ref()?
            .memory
            .iter()
            .filter(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let description = self.setter_ref()?.role.setting.clone().unwrap_or_default();
        let end_template = self.prompt_text(END_PROMPT_ID, FALLBACK_END_PROMPT).await;
        let end_prompt = render(
            &end_template,
            &[
                ("soup", &surface),
                ("answer", &truth),
                ("description", &description),
                ("content", &asked),
            ],
        );

        let setter_id = self.setter_ref()?.agent_id.clone();
        self.setter_mut()?.set_system(end_prompt);
        let first = self
            .setter_ref()?
            .memory
            .first()
            .cloned()
            .ok_or_else(|| ParleyError::Game("setter memory is empty".into()))?;
        let response = self
            .setter_ref()?
            .chat_messages(vec![first], REVEAL_TEMPERATURE)
            .await?;
        let final_answer = response.content.clone();
        let usage = usage_of(&response);
        self.record_usage(&setter_id, &usage);
        self.setter_mut()?.add_memory("assistant", final_answer.clone());

        let reveal = format!("【谜底揭晓】\n{final_answer}");
        let message = {
            let mut message = GameMessage::new(&self.ctx.session_id, "system", reveal);
            message.usage = Some(usage);
            message
        };
        self.emit(message);
        self.emit_plain("system", GAME_OVER_ANNOUNCEMENT);

        let round = self.session.as_ref().map(|s| s.current_round).unwrap_or(0);
        self.save_state().await?;
        self.ctx
            .hub
            .drop_session(GAME_TYPE, &self.ctx.session_id)
            .await?;
        self.setter = None;
        self.players.clear();

        info!(session_id = %self.ctx.session_id, round, "turtle soup ended");

        let mut outcome = TurnOutcome::new(TurnState::GameOver)
            .with_message("Game over")
            .with_round(round);
        outcome.extra.insert("soup_surface".into(), json!(surface));
        outcome.extra.insert("soup_truth".into(), json!(truth));
        outcome
            .extra
            .insert("final_answer".into(), json!(final_answer));
        Ok(outcome)
    }
}

/// Fills `{name}` placeholders in a prompt template.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

fn usage_of(response: &ChatResponse) -> MessageUsage {
    MessageUsage {
        input_tokens: response.input_tokens,
        output_tokens: response.output_tokens,
        total_tokens: response.total_tokens,
        price: response.price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parley_catalog::manager::CacheFlags;
    use parley_catalog::CatalogManager;
    use parley_core::records::ModelRecord;
    use parley_core::traits::ConfigSource;
    use parley_core::types::SessionId;
    use parley_hub::Hub;
    use parley_llm::{AccountedProvider, AdapterFactory};
    use parley_session::SessionStore;
    use parley_test_utils::{memory_store, sample_role, FakeConfigSource, MockProvider};
    use parley_usage::{UsageRecord, UsageSink};
    use rust_decimal_macros::dec;

    use crate::runtime::GameSettings;

    #[test]
    fn game_params_accept_gateway_key_names() {
        let params: GameParams = serde_json::from_value(serde_json::json!({
            "player_count": 2,
            "user_info": {"name": "mo"},
            "roles": ["r1", "r2"],
        }))
        .unwrap();
        assert_eq!(params.player_count, Some(2));
        assert_eq!(params.user_info.unwrap()["name"], "mo");
        assert_eq!(params.roles.unwrap().len(), 2);
    }

    struct NullSink;

    #[async_trait]
    impl UsageSink for NullSink {
        async fn record_usage(&self, _record: &UsageRecord) -> Result<(), ParleyError> {
            Ok(())
        }
    }

    fn accounted(mock: MockProvider, session_id: &SessionId) -> AccountedProvider {
        let model = ModelRecord {
            model_id: "mock-model".into(),
            provider_id: 1,
            display_name: "Mock".into(),
            input_price: dec!(0),
            output_price: dec!(0),
            status: true,
            input_tokens: 0,
            output_tokens: 0,
        };
        AccountedProvider::new(Arc::new(mock), model, Arc::new(NullSink))
            .for_session(session_id.as_str())
    }

    fn test_ctx(session_id: &SessionId) -> GameContext {
        let store = memory_store();
        let source = FakeConfigSource::new() as Arc<dyn ConfigSource>;
        let catalog = Arc::new(CatalogManager::new(
            Arc::clone(&store),
            "knowleadge_api:",
            source,
            CacheFlags::default(),
        ));
        GameContext {
            session_id: session_id.clone(),
            sessions: Arc::new(SessionStore::new(
                Arc::clone(&store),
                Duration::from_secs(7 * 24 * 3600),
                Duration::from_secs(24 * 3600),
            )),
            hub: Arc::new(Hub::new(Arc::clone(&store))),
            catalog: Arc::clone(&catalog),
            adapters: Arc::new(AdapterFactory::new(catalog, Arc::new(NullSink))),
            settings: GameSettings {
                default_model_id: "mock-model".into(),
                setter_model_id: None,
                default_player_count: 2,
            },
        }
    }

    /// A game mid-flight: session saved, setter plus one player live.
    async fn running_game(
        setter_mock: MockProvider,
        player_mock: MockProvider,
    ) -> TurtleSoupGame {
        let session_id = SessionId("ts-test".into());
        let ctx = test_ctx(&session_id);
        let mut game = TurtleSoupGame::new(ctx);

        let mut setter = GameAgent::new(
            SETTER_IDENTITY,
            sample_role("judge"),
            "mock-model",
            accounted(setter_mock, &session_id),
        );
        setter.set_system("You judge the puzzle.");
        let mut player = GameAgent::new(
            PLAYER_IDENTITY,
            sample_role("sherlock"),
            "mock-model",
            accounted(player_mock, &session_id),
        );
        player.set_system("You ask questions.");

        let mut session = GameSession::new(&session_id, GAME_TYPE);
        session.set_state("current_round", json!(0));
        session.set_state("solved_players", json!([]));
        session.set_state("human_has_answered", json!(false));
        session.set_state("is_game_over", json!(false));
        session.set_state("soup_surface", json!("A man dies after ordering soup."));
        session.set_state("soup_truth", json!("He recognized the taste."));

        game.setter = Some(setter);
        game.players = vec![player];
        game.session = Some(session);
        game.save_state().await.unwrap();
        game
    }

    #[tokio::test]
    async fn human_question_gets_judged_and_relayed() {
        let setter_mock = MockProvider::new();
        setter_mock
            .push_tool_call(
                "function_judge_answer",
                json!({"is_solved": 0, "answer": "no"}),
            )
            .await;
        let mut game = running_game(setter_mock, MockProvider::new()).await;

        let outcome = game
            .play_round(Some("Was the soup poisoned?".into()))
            .await
            .unwrap();
        assert_eq!(outcome.status, TurnState::AiTurn);
        assert_eq!(outcome.current_round, Some(1));

        // The setter's reply landed in the transcript.
        let session = game.session.as_ref().unwrap();
        let last = session.game_record.last().unwrap();
        assert_eq!(last.role, "setter");
        assert_eq!(last.content, "no");

        // The player heard about the exchange.
        let player = &game.players[0];
        assert!(player
            .memory
            .iter()
            .any(|m| m.role == "user" && m.content.contains("Was the soup poisoned?")));
    }

    #[tokio::test]
    async fn solved_guess_ends_the_game_with_reveal() {
        let setter_mock = MockProvider::new();
        setter_mock
            .push_tool_call(
                "function_judge_answer",
                json!({"is_solved": 1, "answer": "Exactly right."}),
            )
            .await;
        setter_mock.push_text("He had eaten it once before, at sea.").await;
        let mut game = running_game(setter_mock, MockProvider::new()).await;

        let outcome = game
            .play_round(Some("He recognized the taste from the shipwreck.".into()))
            .await
            .unwrap();
        assert_eq!(outcome.status, TurnState::GameOver);
        assert_eq!(
            outcome.extra.get("final_answer").and_then(Value::as_str),
            Some("He had eaten it once before, at sea.")
        );
        assert_eq!(
            outcome.extra.get("soup_surface").and_then(Value::as_str),
            Some("A man dies after ordering soup.")
        );
        assert!(game.setter.is_none());
        assert!(game.players.is_empty());
    }

    #[tokio::test]
    async fn solved_game_announces_success_reveal_and_game_over() {
        let setter_mock = MockProvider::new();
        setter_mock
            .push_tool_call(
                "function_judge_answer",
                json!({"is_solved": 1, "answer": "对"}),
            )
            .await;
        setter_mock.push_text("他在海难中尝过同样的汤。").await;
        let mut game = running_game(setter_mock, MockProvider::new()).await;
        game.play_round(Some("他认出了汤的味道".into())).await.unwrap();

        let stored = game
            .ctx
            .sessions
            .load(GAME_TYPE, &game.ctx.session_id)
            .await
            .unwrap()
            .unwrap();
        let contents: Vec<&str> = stored
            .game_record
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert!(contents.iter().any(|c| c.contains("恭喜玩家解谜成功！")));
        assert!(contents.iter().any(|c| c.starts_with("【谜底揭晓】")));
        assert!(contents.iter().any(|c| *c == GAME_OVER_ANNOUNCEMENT));
    }

    #[tokio::test]
    async fn ai_round_broadcasts_player_question() {
        let setter_mock = MockProvider::new();
        setter_mock
            .push_tool_call(
                "function_judge_answer",
                json!({"is_solved": 0, "answer": "irrelevant"}),
            )
            .await;
        let player_mock = MockProvider::new();
        player_mock.push_text("Was it night?").await;
        let mut game = running_game(setter_mock, player_mock).await;

        let outcome = game.play_round(None).await.unwrap();
        assert_eq!(outcome.status, TurnState::WaitingForHuman);
        assert_eq!(outcome.current_round, Some(1));

        let session = game.session.as_ref().unwrap();
        let player_msg = session
            .game_record
            .iter()
            .find(|m| m.role == PLAYER_IDENTITY)
            .unwrap();
        assert_eq!(player_msg.content, "Was it night?");
        assert!(player_msg.agent_id.is_some());

        // The asker got the setter's reply back.
        assert!(game.players[0]
            .memory
            .iter()
            .any(|m| m.content.contains("The setter replied: irrelevant")));
    }

    #[tokio::test(start_paused = true)]
    async fn judge_retries_on_empty_tool_result() {
        let setter_mock = MockProvider::new();
        setter_mock.push_empty_tool_result().await;
        setter_mock
            .push_tool_call(
                "function_judge_answer",
                json!({"is_solved": 0, "answer": "no"}),
            )
            .await;
        let mut game = running_game(setter_mock, MockProvider::new()).await;

        let outcome = game.play_round(Some("Is it day?".into())).await.unwrap();
        assert_eq!(outcome.status, TurnState::AiTurn);
        let session = game.session.as_ref().unwrap();
        assert_eq!(session.game_record.last().unwrap().content, "no");
    }

    #[tokio::test]
    async fn prose_judge_reply_counts_as_answer() {
        let setter_mock = MockProvider::new();
        setter_mock.push_text("That has nothing to do with the soup.").await;
        let mut game = running_game(setter_mock, MockProvider::new()).await;

        let outcome = game.play_round(Some("Is the moon cheese?".into())).await.unwrap();
        assert_eq!(outcome.status, TurnState::AiTurn);
        let session = game.session.as_ref().unwrap();
        assert_eq!(
            session.game_record.last().unwrap().content,
            "That has nothing to do with the soup."
        );
    }

    #[tokio::test]
    async fn end_game_command_triggers_reveal() {
        let setter_mock = MockProvider::new();
        setter_mock.push_text("The truth was simple all along.").await;
        let mut game = running_game(setter_mock, MockProvider::new()).await;

        let outcome = game.play_round(Some("end game".into())).await.unwrap();
        assert_eq!(outcome.status, TurnState::GameOver);
        assert_eq!(
            outcome.extra.get("final_answer").and_then(Value::as_str),
            Some("The truth was simple all along.")
        );
    }

    #[tokio::test]
    async fn custom_puzzle_skips_generation() {
        let session_id = SessionId("ts-custom".into());
        let ctx = test_ctx(&session_id);
        let mut game = TurtleSoupGame::new(ctx);
        game.setter = Some(GameAgent::new(
            SETTER_IDENTITY,
            sample_role("judge"),
            "mock-model",
            accounted(MockProvider::new(), &session_id),
        ));

        let (surface, truth, usage) = game
            .create_puzzle(
                Some(CustomPuzzle {
                    surface: "A light goes out.".into(),
                    truth: "A lighthouse keeper slept.".into(),
                }),
                &Value::Null,
            )
            .await
            .unwrap();
        assert_eq!(surface, "A light goes out.");
        assert_eq!(truth, "A lighthouse keeper slept.");
        assert!(usage.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn puzzle_generation_retries_then_fails() {
        let session_id = SessionId("ts-retry".into());
        let ctx = test_ctx(&session_id);
        let mut game = TurtleSoupGame::new(ctx);
        let mock = MockProvider::new();
        mock.push_empty_tool_result().await;
        mock.push_empty_tool_result().await;
        mock.push_empty_tool_result().await;
        game.setter = Some(GameAgent::new(
            SETTER_IDENTITY,
            sample_role("judge"),
            "mock-model",
            accounted(mock, &session_id),
        ));

        let result = game.create_puzzle(None, &Value::Null).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn session_persists_and_reattaches_agents() {
        let setter_mock = MockProvider::new();
        setter_mock
            .push_tool_call(
                "function_judge_answer",
                json!({"is_solved": 0, "answer": "yes"}),
            )
            .await;
        let mut game = running_game(setter_mock, MockProvider::new()).await;
        game.play_round(Some("Was he at sea?".into())).await.unwrap();

        // Reload the session blob the way a reconnect would.
        let stored = game
            .ctx
            .sessions
            .load(GAME_TYPE, &game.ctx.session_id)
            .await
            .unwrap()
            .unwrap();
        let snapshot = stored.serialized_agents.unwrap();
        let states = decode_agents(&snapshot.agents_data).unwrap();
        assert_eq!(states.len(), 2);
        let setter_state = states.iter().find(|s| s.identity == SETTER_IDENTITY).unwrap();
        assert!(setter_state
            .memory
            .iter()
            .any(|m| m.content.contains("Was he at sea?")));
    }
}
