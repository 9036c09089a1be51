// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The workflow engine: walks the graph, wires node inputs, and
//! suspends/resumes around nodes that wait for external input.

use std::collections::{HashMap, HashSet, VecDeque};

use parley_core::ParleyError;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::context::{WorkflowContext, WorkflowStatus};
use crate::graph::{NodeDefinition, WorkflowDefinition};
use crate::node::{NodeOutcome, NodeServices, NodeStatus, WorkflowNode};

/// What a run produced: the workflow status and the context data after
/// the walk stopped.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub status: WorkflowStatus,
    pub data: Map<String, Value>,
}

/// One engine per workflow definition. The engine itself is stateless
/// across sessions; all run state lives in the [`WorkflowContext`].
pub struct WorkflowEngine {
    definition: WorkflowDefinition,
    nodes: HashMap<String, Box<dyn WorkflowNode>>,
    services: NodeServices,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl WorkflowEngine {
    /// Builds every node up front so graph errors surface at load time,
    /// not mid-session.
    pub fn new(
        definition: WorkflowDefinition,
        services: NodeServices,
    ) -> Result<Self, ParleyError> {
        let mut nodes = HashMap::new();
        for node_def in &definition.nodes {
            let conditions = definition.edge_conditions(&node_def.id);
            nodes.insert(node_def.id.clone(), crate::nodes::build(node_def, conditions)?);
        }
        Ok(Self {
            definition,
            nodes,
            services,
        })
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Runs the workflow from its start node.
    pub async fn execute(
        &self,
        ctx: &mut WorkflowContext,
    ) -> Result<WorkflowOutcome, ParleyError> {
        info!(workflow = %self.definition.id, session = %ctx.session_id.as_str(), "executing workflow");
        ctx.status = WorkflowStatus::Running;
        let start = self.definition.start_node.clone();
        self.run_from(ctx, &start).await
    }

    /// Resumes a suspended workflow with fresh client data.
    ///
    /// The new data is merged into the context, `processing_new_message`
    /// tells input gates to consume it, and a suspended loop gets its
    /// waiting node's processed flag cleared so the iteration can finish.
    pub async fn resume(
        &self,
        ctx: &mut WorkflowContext,
        new_data: Map<String, Value>,
    ) -> Result<WorkflowOutcome, ParleyError> {
        ctx.merge_data(new_data);
        ctx.data
            .insert("processing_new_message".to_string(), Value::Bool(true));

        let (loop_node_id, waiting_flag) = match ctx.data.get("_loop_state") {
            Some(state) => (
                state
                    .get("node_id")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                state
                    .get("waiting_node_id")
                    .and_then(Value::as_str)
                    .map(|waiting| format!("{waiting}_processed")),
            ),
            None => (None, None),
        };
        if let Some(flag) = waiting_flag {
            ctx.data.remove(&flag);
        }
        let start = loop_node_id
            .or_else(|| ctx.current_node_id.clone())
            .or_else(|| {
                ctx.data
                    .get("current_node_id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| self.definition.start_node.clone());

        info!(workflow = %self.definition.id, session = %ctx.session_id.as_str(), node = %start, "resuming workflow");
        ctx.status = WorkflowStatus::Running;
        self.run_from(ctx, &start).await
    }

    async fn run_from(
        &self,
        ctx: &mut WorkflowContext,
        start: &str,
    ) -> Result<WorkflowOutcome, ParleyError> {
        let mut queue: VecDeque<String> = VecDeque::from([start.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let outcome = self.run_node(&current, ctx).await?;
            if outcome.status == NodeStatus::Waiting {
                return Ok(self.suspend(ctx, &current));
            }

            if self.kind_of(&current) == Some("conditional") {
                let selected = outcome
                    .output
                    .get("selected_path")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if let Some(selected) = selected {
                    // The selected branch runs inline, then the walk
                    // continues from it rather than the conditional.
                    if !visited.insert(selected.clone()) {
                        continue;
                    }
                    let branch = self.run_node(&selected, ctx).await?;
                    if branch.status == NodeStatus::Waiting {
                        return Ok(self.suspend(ctx, &selected));
                    }
                    match branch.output.get("selected_path").and_then(Value::as_str) {
                        Some(next) => queue.push_back(next.to_string()),
                        None => {
                            for next in self.definition.successors(&selected) {
                                queue.push_back(next.to_string());
                            }
                        }
                    }
                    continue;
                }
                // No branch matched: fall back to plain edges, if any.
            }

            for next in self.definition.successors(&current) {
                queue.push_back(next.to_string());
            }
        }

        ctx.status = WorkflowStatus::Completed;
        ctx.data.remove("processing_new_message");
        info!(workflow = %self.definition.id, session = %ctx.session_id.as_str(), "workflow completed");
        Ok(WorkflowOutcome {
            status: WorkflowStatus::Completed,
            data: ctx.data.clone(),
        })
    }

    async fn run_node(
        &self,
        id: &str,
        ctx: &mut WorkflowContext,
    ) -> Result<NodeOutcome, ParleyError> {
        let node = self.nodes.get(id).ok_or_else(|| {
            ParleyError::Workflow(format!(
                "workflow '{}' has no node '{id}'",
                self.definition.id
            ))
        })?;
        let Some(node_def) = self.definition.node(id) else {
            return Err(ParleyError::Workflow(format!(
                "workflow '{}' has no definition for node '{id}'",
                self.definition.id
            )));
        };

        self.prepare_inputs(node_def, ctx);
        ctx.current_node_id = Some(id.to_string());
        debug!(workflow = %self.definition.id, node = %id, kind = %node_def.kind, "running node");

        let outcome = match node.run(ctx, &self.services).await {
            Ok(outcome) => outcome,
            Err(e) => {
                ctx.status = WorkflowStatus::Failed;
                warn!(workflow = %self.definition.id, node = %id, error = %e, "node failed");
                return Err(e);
            }
        };
        ctx.node_results
            .insert(id.to_string(), Value::Object(outcome.output.clone()));
        Ok(outcome)
    }

    /// Wires a node's declared inputs from prior results and context
    /// data. Message-like nodes also see every prior output and the
    /// global/state values, since their templates reference anything.
    fn prepare_inputs(&self, node_def: &NodeDefinition, ctx: &mut WorkflowContext) {
        let mut inputs = Map::new();

        if matches!(node_def.kind.as_str(), "message" | "ai_player_speak") {
            for result in ctx.node_results.values() {
                if let Value::Object(fields) = result {
                    for (key, field) in fields {
                        inputs.insert(key.clone(), field.clone());
                    }
                }
            }
            for (key, field) in &ctx.data {
                if key.starts_with('_') || key == "global" || key == "state" {
                    continue;
                }
                inputs.entry(key.clone()).or_insert_with(|| field.clone());
            }
            for container in ["global", "state"] {
                if let Some(Value::Object(fields)) = ctx.data.get(container) {
                    for (key, field) in fields {
                        inputs.entry(key.clone()).or_insert_with(|| field.clone());
                    }
                    inputs.insert(container.to_string(), ctx.data[container].clone());
                }
            }
        }

        for binding in &node_def.inputs {
            if let (Some(source), Some(output)) = (&binding.source_node, &binding.source_output) {
                if let Some(found) = ctx.node_results.get(source).and_then(|r| r.get(output)) {
                    inputs.insert(binding.key.clone(), found.clone());
                    continue;
                }
                debug!(node = %node_def.id, input = %binding.key, source = %source, "input source not yet produced");
            }
            if !inputs.contains_key(&binding.key) {
                if let Some(found) = ctx.data.get(&binding.key) {
                    inputs.insert(binding.key.clone(), found.clone());
                }
            }
        }

        ctx.current_node_inputs = inputs;
    }

    fn suspend(&self, ctx: &mut WorkflowContext, node_id: &str) -> WorkflowOutcome {
        ctx.current_node_id = Some(node_id.to_string());
        ctx.data.insert(
            "current_node_id".to_string(),
            Value::String(node_id.to_string()),
        );
        ctx.status = WorkflowStatus::Waiting;
        debug!(workflow = %self.definition.id, node = %node_id, "workflow suspended");
        WorkflowOutcome {
            status: WorkflowStatus::Waiting,
            data: ctx.data.clone(),
        }
    }

    fn kind_of(&self, id: &str) -> Option<&str> {
        self.definition.node(id).map(|d| d.kind.as_str())
    }
}
