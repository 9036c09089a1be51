// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The node trait and the shared services nodes run against.

use std::sync::Arc;

use async_trait::async_trait;
use parley_catalog::CatalogManager;
use parley_core::ParleyError;
use parley_llm::AdapterFactory;
use parley_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::WorkflowContext;

/// Execution status of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Idle,
    Running,
    /// The node needs external input; the engine suspends here.
    Waiting,
    Completed,
    Failed,
}

/// What a node run produced: its status and its output object, which the
/// engine records under the node's id in `node_results`.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub status: NodeStatus,
    pub output: Map<String, Value>,
}

impl NodeOutcome {
    pub fn completed(output: Map<String, Value>) -> Self {
        Self {
            status: NodeStatus::Completed,
            output,
        }
    }

    pub fn waiting(output: Map<String, Value>) -> Self {
        Self {
            status: NodeStatus::Waiting,
            output,
        }
    }
}

/// Shared handles every node can reach: the catalog for roles and
/// prompts, the adapter factory for model providers, and the native tool
/// registry.
#[derive(Clone)]
pub struct NodeServices {
    pub catalog: Arc<CatalogManager>,
    pub adapters: Arc<AdapterFactory>,
    pub tools: Arc<ToolRegistry>,
    /// Model used when neither the role nor the graph names one.
    pub default_model_id: String,
}

/// One executable workflow node.
///
/// Implementations are built once per engine from a `NodeDefinition` and
/// must be re-entrant: all mutable run state lives in the context.
#[async_trait]
pub trait WorkflowNode: Send + Sync {
    fn id(&self) -> &str;

    /// Node kind string, matching the definition's `component_type`.
    fn kind(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, ParleyError>;
}
