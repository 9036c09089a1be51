// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Invoke a registered native tool from the workflow graph.
//!
//! The node never evaluates code from the template; `tool_name` must
//! name a tool in the shared registry. Declared inputs are gathered from
//! the prepared node inputs and passed as the tool's JSON arguments.

use async_trait::async_trait;
use parley_core::ParleyError;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::WorkflowContext;
use crate::graph::{InputBinding, OutputBinding};
use crate::node::{NodeOutcome, NodeServices, WorkflowNode};

pub struct FunctionToolNode {
    id: String,
    tool_name: String,
    inputs: Vec<InputBinding>,
    outputs: Vec<OutputBinding>,
}

impl FunctionToolNode {
    pub fn new(
        id: impl Into<String>,
        config: &Map<String, Value>,
        inputs: Vec<InputBinding>,
        outputs: Vec<OutputBinding>,
    ) -> Self {
        Self {
            id: id.into(),
            tool_name: config
                .get("tool_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            inputs,
            outputs,
        }
    }
}

#[async_trait]
impl WorkflowNode for FunctionToolNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "function_tool"
    }

    async fn run(
        &self,
        ctx: &mut WorkflowContext,
        services: &NodeServices,
    ) -> Result<NodeOutcome, ParleyError> {
        let tool = services.tools.get(&self.tool_name).ok_or_else(|| {
            ParleyError::Workflow(format!(
                "function_tool node '{}' references unknown tool '{}'",
                self.id, self.tool_name
            ))
        })?;

        let mut args = Map::new();
        for binding in &self.inputs {
            if let Some(value) = ctx.current_node_inputs.get(&binding.key) {
                args.insert(binding.key.clone(), value.clone());
            } else if binding.required {
                return Err(ParleyError::Workflow(format!(
                    "function_tool node '{}' missing required input '{}'",
                    self.id, binding.key
                )));
            }
        }

        debug!(node = %self.id, tool = %self.tool_name, "invoking workflow tool");
        let result = tool.invoke(Value::Object(args)).await?;
        if result.is_error {
            return Err(ParleyError::Workflow(format!(
                "tool '{}' failed: {}",
                self.tool_name, result.content
            )));
        }

        // Tool output is JSON where possible, raw text otherwise.
        let value: Value = serde_json::from_str(&result.content)
            .unwrap_or(Value::String(result.content));

        let mut output = Map::new();
        match (&value, self.outputs.as_slice()) {
            // A single declared output key takes the whole result.
            (_, [declared]) => {
                output.insert(declared.key.clone(), value.clone());
            }
            // Object results spread into the output.
            (Value::Object(fields), _) => {
                for (key, field) in fields {
                    output.insert(key.clone(), field.clone());
                }
            }
            _ => {
                output.insert("result".to_string(), value.clone());
            }
        }

        for (key, field) in &output {
            ctx.data.insert(key.clone(), field.clone());
        }
        Ok(NodeOutcome::completed(output))
    }
}
