// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow session management.
//!
//! Live sessions (context plus agents) stay in memory behind a per-session
//! lock; after every run the serializable part is persisted through the
//! session store so a reconnecting client can pick up a suspended flow
//! even after a restart.

use std::sync::Arc;

use dashmap::DashMap;
use parley_core::{ParleyError, SessionId};
use parley_game::GameAgent;
use parley_session::{GameSession, SessionStore};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::context::{ContextSnapshot, WorkflowContext};
use crate::engine::{WorkflowEngine, WorkflowOutcome};
use crate::graph::WorkflowLibrary;
use crate::node::NodeServices;

/// KV namespace for persisted workflow sessions.
pub const WORKFLOW_GAME_TYPE: &str = "workflow";

struct LiveSession {
    workflow_id: String,
    context: WorkflowContext,
}

/// Creates, runs, resumes, and persists workflow sessions.
pub struct WorkflowService {
    library: WorkflowLibrary,
    services: NodeServices,
    store: Arc<SessionStore>,
    engines: DashMap<String, Arc<WorkflowEngine>>,
    sessions: DashMap<String, Arc<Mutex<LiveSession>>>,
}

impl WorkflowService {
    pub fn new(
        library: WorkflowLibrary,
        services: NodeServices,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            library,
            services,
            store,
            engines: DashMap::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn workflow_ids(&self) -> Vec<String> {
        self.library.ids().into_iter().map(str::to_string).collect()
    }

    fn engine_for(&self, workflow_id: &str) -> Result<Arc<WorkflowEngine>, ParleyError> {
        if let Some(engine) = self.engines.get(workflow_id) {
            return Ok(Arc::clone(&engine));
        }
        let definition = self.library.get(workflow_id).ok_or_else(|| {
            ParleyError::Workflow(format!("unknown workflow: {workflow_id}"))
        })?;
        let engine = Arc::new(WorkflowEngine::new(
            definition.clone(),
            self.services.clone(),
        )?);
        self.engines
            .insert(workflow_id.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    /// Creates a fresh session for a workflow. `init` lands in the
    /// context data (`character_list`, `user_data`, and friends).
    pub async fn create_session(
        &self,
        workflow_id: &str,
        session_id: &SessionId,
        init: Map<String, Value>,
        events: mpsc::UnboundedSender<Value>,
    ) -> Result<(), ParleyError> {
        // Fails early on an unknown workflow.
        self.engine_for(workflow_id)?;

        let mut context = WorkflowContext::new(session_id.clone());
        context.merge_data(init);
        context.attach_events(events);

        info!(workflow = %workflow_id, session = %session_id.as_str(), "workflow session created");
        self.sessions.insert(
            session_id.as_str().to_string(),
            Arc::new(Mutex::new(LiveSession {
                workflow_id: workflow_id.to_string(),
                context,
            })),
        );
        Ok(())
    }

    /// True when the session is live in memory or parked in the store.
    pub async fn session_exists(&self, session_id: &SessionId) -> Result<bool, ParleyError> {
        if self.sessions.contains_key(session_id.as_str()) {
            return Ok(true);
        }
        self.store.exists(WORKFLOW_GAME_TYPE, session_id).await
    }

    /// Re-attaches a client to an existing session, reviving it from the
    /// store when it is not live. Returns an error when nothing is known
    /// about the session.
    pub async fn connect(
        &self,
        session_id: &SessionId,
        events: mpsc::UnboundedSender<Value>,
    ) -> Result<(), ParleyError> {
        if let Some(live) = self.sessions.get(session_id.as_str()) {
            let live = Arc::clone(&live);
            live.lock().await.context.attach_events(events);
            return Ok(());
        }

        let session = self
            .store
            .load(WORKFLOW_GAME_TYPE, session_id)
            .await?
            .ok_or_else(|| {
                ParleyError::Workflow(format!("unknown session: {}", session_id.as_str()))
            })?;
        let snapshot_value = session.state_value("workflow_context").ok_or_else(|| {
            ParleyError::Workflow(format!(
                "session {} has no workflow context",
                session_id.as_str()
            ))
        })?;
        let workflow_id = session
            .state_value("workflow_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let snapshot: ContextSnapshot = serde_json::from_value(snapshot_value.clone())?;
        let agents = self.restore_agents(&snapshot, session_id).await?;
        let mut context = snapshot.into_context(session_id.clone(), agents);
        context.attach_events(events);

        debug!(session = %session_id.as_str(), workflow = %workflow_id, "revived workflow session from store");
        self.sessions.insert(
            session_id.as_str().to_string(),
            Arc::new(Mutex::new(LiveSession {
                workflow_id,
                context,
            })),
        );
        Ok(())
    }

    async fn restore_agents(
        &self,
        snapshot: &ContextSnapshot,
        session_id: &SessionId,
    ) -> Result<Vec<GameAgent>, ParleyError> {
        let mut agents = Vec::new();
        for state in snapshot.agent_states()? {
            let provider = self
                .services
                .adapters
                .provider_for_model(&state.model_id)
                .await?
                .for_session(session_id.as_str());
            agents.push(GameAgent::restore(state, provider));
        }
        Ok(agents)
    }

    /// Runs the workflow from the start.
    pub async fn execute(&self, session_id: &SessionId) -> Result<WorkflowOutcome, ParleyError> {
        self.drive(session_id, None).await
    }

    /// Resumes a suspended workflow with new client data.
    pub async fn resume(
        &self,
        session_id: &SessionId,
        data: Map<String, Value>,
    ) -> Result<WorkflowOutcome, ParleyError> {
        self.drive(session_id, Some(data)).await
    }

    async fn drive(
        &self,
        session_id: &SessionId,
        resume_data: Option<Map<String, Value>>,
    ) -> Result<WorkflowOutcome, ParleyError> {
        let live = self
            .sessions
            .get(session_id.as_str())
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| {
                ParleyError::Workflow(format!("unknown session: {}", session_id.as_str()))
            })?;
        let mut live = live.lock().await;
        let engine = self.engine_for(&live.workflow_id)?;

        let outcome = match resume_data {
            None => engine.execute(&mut live.context).await?,
            Some(data) => engine.resume(&mut live.context, data).await?,
        };

        self.persist(&live).await?;
        Ok(outcome)
    }

    async fn persist(&self, live: &LiveSession) -> Result<(), ParleyError> {
        let snapshot = live.context.snapshot()?;
        let mut session = match self
            .store
            .load(WORKFLOW_GAME_TYPE, &live.context.session_id)
            .await?
        {
            Some(session) => session,
            None => GameSession::new(&live.context.session_id, WORKFLOW_GAME_TYPE),
        };
        session.set_state("workflow_id", Value::String(live.workflow_id.clone()));
        session.set_state("workflow_context", serde_json::to_value(&snapshot)?);
        self.store.save(&mut session).await
    }

    /// Drops a live session, keeping the persisted copy.
    pub fn detach(&self, session_id: &SessionId) {
        self.sessions.remove(session_id.as_str());
    }
}
