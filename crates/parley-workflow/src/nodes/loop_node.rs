// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Looping over an inner sub-graph.
//!
//! Three modes: `fixed` runs a set number of iterations, `conditional`
//! keeps going while a context value satisfies an operator, `iterator`
//! walks a resolved list binding each element as the loop item. The
//! inner nodes run with `_loop {index, item, is_loop_context}` visible
//! in the context; an inner Waiting suspends the whole workflow with
//! the loop's progress parked under `_loop_state` so a later resume can
//! finish the in-flight iteration and continue.

use std::collections::HashSet;

use async_trait::async_trait;
use parley_core::ParleyError;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::context::WorkflowContext;
use crate::graph::{EdgeDefinition, NodeDefinition};
use crate::node::{NodeOutcome, NodeServices, NodeStatus, WorkflowNode};
use crate::value;

const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Input names the loop item auto-binds to when an inner node declares
/// them without an explicit source.
const ITEM_INPUT_NAMES: [&str; 4] = ["item", "player", "character", "game_role"];

enum LoopMode {
    Fixed,
    Conditional {
        key: String,
        expected: Value,
        operator: String,
    },
    Iterator {
        source: String,
    },
}

impl LoopMode {
    fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Fixed => "fixed",
            LoopMode::Conditional { .. } => "conditional",
            LoopMode::Iterator { .. } => "iterator",
        }
    }
}

struct InnerNode {
    definition: NodeDefinition,
    node: Box<dyn WorkflowNode>,
}

pub struct LoopNode {
    id: String,
    mode: LoopMode,
    max_iterations: usize,
    nodes: Vec<InnerNode>,
    edges: Vec<EdgeDefinition>,
}

impl std::fmt::Debug for LoopNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopNode")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl LoopNode {
    pub fn new(id: impl Into<String>, config: &Map<String, Value>) -> Result<Self, ParleyError> {
        let id = id.into();
        let mode = match config.get("mode").and_then(Value::as_str).unwrap_or("fixed") {
            "conditional" => LoopMode::Conditional {
                key: config
                    .get("condition_key")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                expected: config.get("condition_value").cloned().unwrap_or(Value::Bool(true)),
                operator: config
                    .get("condition_operator")
                    .and_then(Value::as_str)
                    .unwrap_or("==")
                    .to_string(),
            },
            "iterator" => LoopMode::Iterator {
                source: config
                    .get("iterator_source")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => LoopMode::Fixed,
        };
        let max_iterations = config
            .get("max_iterations")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);

        let definitions: Vec<NodeDefinition> = config
            .get("internal_nodes")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?
            .unwrap_or_default();
        let edges: Vec<EdgeDefinition> = config
            .get("internal_edges")
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()?
            .unwrap_or_default();
        if definitions.is_empty() {
            return Err(ParleyError::Workflow(format!(
                "loop node '{id}' has no internal nodes"
            )));
        }

        let mut nodes = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let conditions = edge_conditions_for(&edges, &definition.id);
            let node = crate::nodes::build(&definition, conditions)?;
            nodes.push(InnerNode { definition, node });
        }

        Ok(Self {
            id,
            mode,
            max_iterations,
            nodes,
            edges,
        })
    }

    fn inner(&self, id: &str) -> Option<&InnerNode> {
        self.nodes.iter().find(|n| n.definition.id == id)
    }

    /// Inner entry points: nodes no internal edge targets.
    fn start_nodes(&self) -> Vec<&str> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.target.as_str()).collect();
        self.nodes
            .iter()
            .map(|n| n.definition.id.as_str())
            .filter(|id| !targets.contains(id))
            .collect()
    }

    fn successors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == id && e.condition.is_none())
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Inputs for an inner node: explicit sources from the iteration's
    /// results, key-name matches across prior results, the loop item for
    /// the conventional input names, and for message-like nodes the
    /// whole visible context.
    fn prepare_inner_inputs(
        &self,
        inner: &InnerNode,
        ctx: &WorkflowContext,
        results: &Map<String, Value>,
        iteration: usize,
        item: Option<&Value>,
    ) -> Map<String, Value> {
        let mut inputs = Map::new();

        if matches!(inner.definition.kind.as_str(), "message" | "ai_player_speak") {
            for result in results.values() {
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
            inputs.insert("loop_index".to_string(), json!(iteration));
            if let Some(item) = item {
                inputs.insert("loop_item".to_string(), item.clone());
            }
        }

        for binding in &inner.definition.inputs {
            if let (Some(source), Some(output)) = (&binding.source_node, &binding.source_output) {
                if let Some(found) = results.get(source).and_then(|r| r.get(output)) {
                    inputs.insert(binding.key.clone(), found.clone());
                    continue;
                }
            }
            if inputs.contains_key(&binding.key) {
                continue;
            }
            if let Some(item) = item {
                if ITEM_INPUT_NAMES.contains(&binding.key.as_str()) {
                    inputs.insert(binding.key.clone(), item.clone());
                    continue;
                }
            }
            // Key-name match against any prior result in this iteration.
            for result in results.values() {
                if let Some(found) = result.get(&binding.key) {
                    inputs.insert(binding.key.clone(), found.clone());
                    break;
                }
            }
            if !inputs.contains_key(&binding.key) {
                if let Some(found) = ctx.data.get(&binding.key) {
                    inputs.insert(binding.key.clone(), found.clone());
                }
            }
        }

        inputs
    }

    /// Runs one iteration of the inner graph. Returns the id of a node
    /// that suspended, or `None` when the iteration completed.
    async fn run_iteration(
        &self,
        ctx: &mut WorkflowContext,
        services: &NodeServices,
        iteration: usize,
        item: Option<&Value>,
        start_override: Option<&str>,
        results: &mut Map<String, Value>,
    ) -> Result<Option<String>, ParleyError> {
        let mut loop_marker = Map::new();
        loop_marker.insert("index".to_string(), json!(iteration));
        loop_marker.insert("is_loop_context".to_string(), Value::Bool(true));
        if let Some(item) = item {
            loop_marker.insert("item".to_string(), item.clone());
        }
        ctx.data
            .insert("_loop".to_string(), Value::Object(loop_marker));

        let mut queue: Vec<String> = match start_override {
            Some(id) => vec![id.to_string()],
            None => self.start_nodes().into_iter().map(str::to_string).collect(),
        };
        let mut visited: HashSet<String> = HashSet::new();

        while !queue.is_empty() {
            let current = queue.remove(0);
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(inner) = self.inner(&current) else {
                warn!(node = %self.id, inner = %current, "loop edge references unknown inner node");
                continue;
            };

            ctx.current_node_inputs =
                self.prepare_inner_inputs(inner, ctx, results, iteration, item);
            let outcome = inner.node.run(ctx, services).await?;
            results.insert(current.clone(), Value::Object(outcome.output.clone()));

            if outcome.status == NodeStatus::Waiting {
                return Ok(Some(current));
            }

            // Conditional inner nodes route to their selected target.
            if let Some(selected) = outcome
                .output
                .get("selected_path")
                .and_then(Value::as_str)
                .map(str::to_string)
            {
                queue.push(selected);
                continue;
            }
            for next in self.successors(&current) {
                queue.push(next.to_string());
            }
        }
        Ok(None)
    }

    fn condition_holds(&self, ctx: &WorkflowContext) -> bool {
        let LoopMode::Conditional {
            key,
            expected,
            operator,
        } = &self.mode
        else {
            return true;
        };
        let Some(actual) = value::resolve(&ctx.data, &ctx.node_results, key) else {
            warn!(node = %self.id, key = %key, "loop condition key absent, stopping");
            return false;
        };
        // Boolean expectations coerce the actual value ("yes", 1, ...).
        if let Value::Bool(expected_bool) = expected {
            let actual_bool = value::as_bool(&actual);
            return match operator.as_str() {
                "!=" => actual_bool != *expected_bool,
                _ => actual_bool == *expected_bool,
            };
        }
        value::compare(operator, &actual, expected)
    }

    fn clean_iteration_state(&self, ctx: &mut WorkflowContext) {
        ctx.data
            .insert("user_message".to_string(), Value::String(String::new()));
        let stale: Vec<String> = ctx
            .data
            .keys()
            .filter(|k| k.ends_with("_processed"))
            .cloned()
            .collect();
        for key in stale {
            ctx.data.remove(&key);
        }
    }
}

fn edge_conditions_for(
    edges: &[EdgeDefinition],
    node_id: &str,
) -> Vec<crate::graph::EdgeCondition> {
    edges
        .iter()
        .filter(|e| e.source == node_id)
        .filter_map(|e| {
            e.condition.as_ref().map(|c| crate::graph::EdgeCondition {
                target: e.target.clone(),
                key: c.key.clone(),
                value: c.value.clone(),
                operator: c.operator.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl WorkflowNode for LoopNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "loop"
    }

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, ParleyError> {
        let mut iteration: usize = 0;
        let mut results = Map::new();
        let mut resume_from: Option<String> = None;

        // A parked `_loop_state` means we are finishing a suspended run.
        if let Some(Value::Object(saved)) = ctx.data.remove("_loop_state") {
            iteration = saved
                .get("iteration")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize;
            if let Some(Value::Object(parked)) = saved.get("results").cloned() {
                results = parked;
            }
            resume_from = saved
                .get("waiting_node_id")
                .and_then(Value::as_str)
                .map(str::to_string);
            debug!(node = %self.id, iteration, resume = ?resume_from, "resuming suspended loop");
        }

        // A missing source degrades to zero iterations and a scalar to a
        // single-item list, never to a failed workflow.
        let items: Vec<Value> = match &self.mode {
            LoopMode::Iterator { source } => {
                match value::resolve(&ctx.data, &ctx.node_results, source) {
                    Some(Value::Array(items)) => items,
                    Some(Value::Null) | None => {
                        debug!(node = %self.id, %source, "iterator source missing, looping zero times");
                        Vec::new()
                    }
                    Some(other) => {
                        debug!(node = %self.id, %source, "iterator source is scalar, looping once");
                        vec![other]
                    }
                }
            }
            _ => Vec::new(),
        };

        let mut last_item: Option<Value> = None;
        loop {
            let continue_loop = match &self.mode {
                LoopMode::Fixed => iteration < self.max_iterations,
                LoopMode::Iterator { .. } => {
                    iteration < items.len() && iteration < self.max_iterations
                }
                LoopMode::Conditional { .. } => {
                    // The in-flight iteration always finishes first.
                    iteration < self.max_iterations
                        && (resume_from.is_some() || self.condition_holds(ctx))
                }
            };
            if !continue_loop {
                break;
            }

            let item = match &self.mode {
                LoopMode::Iterator { .. } => items.get(iteration).cloned(),
                _ => None,
            };
            last_item = item.clone().or(last_item);

            let waiting = self
                .run_iteration(
                    ctx,
                    services,
                    iteration,
                    item.as_ref(),
                    resume_from.take().as_deref(),
                    &mut results,
                )
                .await?;

            if let Some(waiting_node_id) = waiting {
                let state = json!({
                    "node_id": self.id,
                    "mode": self.mode.as_str(),
                    "iteration": iteration,
                    "waiting_node_id": waiting_node_id,
                    "results": results,
                    "item_index": iteration,
                });
                ctx.data.insert("_loop_state".to_string(), state.clone());

                let mut output = Map::new();
                output.insert("loop_index".to_string(), json!(iteration));
                output.insert("loop_waiting".to_string(), Value::Bool(true));
                output.insert(
                    "waiting_node_id".to_string(),
                    Value::String(waiting_node_id),
                );
                output.insert("loop_state".to_string(), state);
                return Ok(NodeOutcome::waiting(output));
            }

            self.clean_iteration_state(ctx);
            iteration += 1;
        }

        ctx.data.remove("_loop");
        debug!(node = %self.id, iterations = iteration, "loop completed");

        let mut output = Map::new();
        output.insert(
            "loop_index".to_string(),
            if iteration > 0 {
                json!(iteration - 1)
            } else {
                Value::Null
            },
        );
        output.insert(
            "loop_item".to_string(),
            last_item.unwrap_or(Value::Null),
        );
        output.insert("loop_results".to_string(), Value::Object(results));
        output.insert("total_iterations".to_string(), json!(iteration));
        Ok(NodeOutcome::completed(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::tests::bare_services;
    use parley_core::SessionId;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn config(raw: Value) -> Map<String, Value> {
        match raw {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn message_inner(id: &str, template: &str) -> Value {
        json!({
            "id": id,
            "component_type": "message",
            "config": {"content_template": template}
        })
    }

    #[tokio::test]
    async fn fixed_loop_runs_the_configured_iterations() {
        let node = LoopNode::new(
            "rounds",
            &config(json!({
                "mode": "fixed",
                "max_iterations": 3,
                "internal_nodes": [message_inner("announce", "iteration {{loop_index}}")]
            })),
        )
        .unwrap();

        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.attach_events(tx);

        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Completed);
        assert_eq!(outcome.output["total_iterations"], json!(3));
        assert_eq!(outcome.output["loop_index"], json!(2));

        let mut contents = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            contents.push(frame["content"].as_str().unwrap_or_default().to_string());
        }
        assert_eq!(contents, vec!["iteration 0", "iteration 1", "iteration 2"]);
        // The loop marker does not leak out.
        assert!(!ctx.data.contains_key("_loop"));
    }

    #[tokio::test]
    async fn iterator_loop_binds_each_item() {
        let node = LoopNode::new(
            "each_player",
            &config(json!({
                "mode": "iterator",
                "iterator_source": "players",
                "internal_nodes": [message_inner("greet", "hello {{loop_item}}")]
            })),
        )
        .unwrap();

        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data
            .insert("players".into(), json!(["alice", "bob"]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.attach_events(tx);

        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.output["total_iterations"], json!(2));
        assert_eq!(outcome.output["loop_item"], json!("bob"));

        assert_eq!(rx.try_recv().unwrap()["content"], "hello alice");
        assert_eq!(rx.try_recv().unwrap()["content"], "hello bob");
    }

    #[tokio::test]
    async fn iterator_loop_degrades_missing_and_scalar_sources() {
        let node = LoopNode::new(
            "each_player",
            &config(json!({
                "mode": "iterator",
                "iterator_source": "players",
                "internal_nodes": [message_inner("greet", "hello {{loop_item}}")]
            })),
        )
        .unwrap();

        // Missing source: zero iterations, no failure.
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.attach_events(tx);
        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Completed);
        assert_eq!(outcome.output["total_iterations"], json!(0));
        assert!(rx.try_recv().is_err());

        // Scalar source: wrapped as a one-item list.
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data.insert("players".into(), json!("alice"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.attach_events(tx);
        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.output["total_iterations"], json!(1));
        assert_eq!(rx.try_recv().unwrap()["content"], "hello alice");
    }

    #[tokio::test]
    async fn conditional_loop_stops_when_condition_fails() {
        let node = LoopNode::new(
            "until_done",
            &config(json!({
                "mode": "conditional",
                "condition_key": "keep_going",
                "condition_value": true,
                "internal_nodes": [message_inner("tick", "tick")]
            })),
        )
        .unwrap();

        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data.insert("keep_going".into(), json!("no"));

        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.output["total_iterations"], json!(0));
        assert_eq!(outcome.output["loop_index"], Value::Null);
    }

    #[tokio::test]
    async fn conditional_loop_coerces_boolean_strings() {
        let node = LoopNode::new(
            "until_done",
            &config(json!({
                "mode": "conditional",
                "condition_key": "keep_going",
                "condition_value": true,
                "max_iterations": 2,
                "internal_nodes": [message_inner("tick", "tick")]
            })),
        )
        .unwrap();

        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        ctx.data.insert("keep_going".into(), json!("yes"));

        // "yes" stays truthy, so only the iteration cap stops the loop.
        let outcome = node.run(&mut ctx, &bare_services()).await.unwrap();
        assert_eq!(outcome.output["total_iterations"], json!(2));
    }

    #[tokio::test]
    async fn inner_player_turn_suspends_and_resumes() {
        let node = LoopNode::new(
            "qa_rounds",
            &config(json!({
                "mode": "fixed",
                "max_iterations": 2,
                "internal_nodes": [
                    {
                        "id": "ask",
                        "component_type": "player_turn",
                        "config": {"turn_message": "Your question?"}
                    },
                    message_inner("echo", "you said {{player_message}}")
                ],
                "internal_edges": [{"source": "ask", "target": "echo"}]
            })),
        )
        .unwrap();

        let services = bare_services();
        let mut ctx = WorkflowContext::new(SessionId("s".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.attach_events(tx);

        // First run: the player turn suspends the loop immediately.
        let outcome = node.run(&mut ctx, &services).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Waiting);
        assert_eq!(outcome.output["loop_waiting"], json!(true));
        assert_eq!(outcome.output["waiting_node_id"], json!("ask"));
        assert_eq!(ctx.data["_loop_state"]["node_id"], json!("qa_rounds"));
        assert_eq!(rx.try_recv().unwrap()["type"], "player_turn");

        // A message arrives; the resumed run finishes iteration 0 and
        // suspends again at iteration 1.
        ctx.data.insert("user_message".into(), json!("is it red?"));
        ctx.data
            .insert("processing_new_message".into(), json!(true));
        let outcome = node.run(&mut ctx, &services).await.unwrap();
        assert_eq!(outcome.status, NodeStatus::Waiting);
        assert_eq!(ctx.data["_loop_state"]["iteration"], json!(1));

        let echoed = rx.try_recv().unwrap();
        assert_eq!(echoed["content"], "you said is it red?");
        assert_eq!(rx.try_recv().unwrap()["type"], "player_turn");
    }

    #[tokio::test]
    async fn empty_loop_body_is_rejected() {
        let err = LoopNode::new("empty", &config(json!({"mode": "fixed"}))).unwrap_err();
        assert!(matches!(err, ParleyError::Workflow(_)));
    }
}
