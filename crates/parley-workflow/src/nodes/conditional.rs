// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Branch selection over conditional edges.

use async_trait::async_trait;
use parley_core::ParleyError;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::WorkflowContext;
use crate::graph::EdgeCondition;
use crate::node::{NodeOutcome, NodeServices, WorkflowNode};
use crate::value;

/// Evaluates its outgoing edge conditions in order and selects the first
/// matching target as `selected_path`. The engine executes the selected
/// node inline before continuing from it.
pub struct ConditionalNode {
    id: String,
    conditions: Vec<EdgeCondition>,
}

impl ConditionalNode {
    pub fn new(id: impl Into<String>, conditions: Vec<EdgeCondition>) -> Self {
        Self {
            id: id.into(),
            conditions,
        }
    }

    /// Lookup order: the last player turn result, then context data
    /// (dotted paths allowed), then the node's prepared inputs.
    fn lookup(&self, ctx: &WorkflowContext, key: &str) -> Option<Value> {
        if let Some(result) = ctx.data.get("player_turn_result") {
            if let Some(found) = result.get(key) {
                return Some(found.clone());
            }
        }
        if let Some(found) = value::resolve(&ctx.data, &ctx.node_results, key) {
            return Some(found);
        }
        ctx.current_node_inputs.get(key).cloned()
    }
}

#[async_trait]
impl WorkflowNode for ConditionalNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "conditional"
    }

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        _services: &NodeServices,
    ) -> Result<NodeOutcome, ParleyError> {
        let mut selected: Option<&EdgeCondition> = None;
        for condition in &self.conditions {
            let Some(actual) = self.lookup(ctx, &condition.key) else {
                debug!(node = %self.id, key = %condition.key, "condition key absent, skipping");
                continue;
            };
            if value::compare(&condition.operator, &actual, &condition.value) {
                selected = Some(condition);
                break;
            }
        }

        let matched = selected.is_some();
        let selected_path = selected.map(|c| c.target.clone());
        debug!(node = %self.id, matched, path = ?selected_path, "conditional evaluated");

        ctx.data
            .insert("conditional_result".to_string(), Value::Bool(matched));
        ctx.data.insert(
            "selected_path".to_string(),
            selected_path
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );

        let mut output = Map::new();
        output.insert("condition_result".to_string(), Value::Bool(matched));
        output.insert(
            "selected_path".to_string(),
            selected_path.map(Value::String).unwrap_or(Value::Null),
        );
        Ok(NodeOutcome::completed(output))
    }
}
