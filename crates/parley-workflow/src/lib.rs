// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graph-driven workflow engine for scripted multi-agent game flows.
//!
//! A workflow is a JSON-defined directed graph of typed nodes: broadcast
//! messages, human-input gates, conditionals, loops over inner
//! sub-graphs, AI speakers, native tool calls, and a game-state entry
//! node that builds the agents. The engine walks the graph, suspends at
//! nodes waiting for player input, and resumes when the client sends
//! the next message; the [`service::WorkflowService`] keeps the live
//! sessions and persists them through the session store.

pub mod context;
pub mod engine;
pub mod graph;
pub mod node;
pub mod nodes;
pub mod service;
pub mod template;
pub mod value;

pub use context::{ContextSnapshot, WorkflowContext, WorkflowStatus};
pub use engine::{WorkflowEngine, WorkflowOutcome};
pub use graph::{
    EdgeCondition, EdgeDefinition, InputBinding, NodeDefinition, OutputBinding,
    WorkflowDefinition, WorkflowLibrary,
};
pub use node::{NodeOutcome, NodeServices, NodeStatus, WorkflowNode};
pub use service::{WorkflowService, WORKFLOW_GAME_TYPE};
