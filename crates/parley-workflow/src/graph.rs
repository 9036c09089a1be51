// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow graph definitions and the JSON template library.
//!
//! A workflow definition is a directed graph of typed nodes. Plain edges
//! connect a node to its successors; an edge with a condition attached is
//! handed to its source node (a `conditional` node) as an edge condition
//! instead of being walked directly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parley_core::ParleyError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// One declared node input. `source_node`/`source_output` wire the input
/// to a prior node's result; inputs without a source are filled from
/// context data by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputBinding {
    pub key: String,
    #[serde(default, rename = "sourceNode")]
    pub source_node: Option<String>,
    #[serde(default, rename = "sourceOutput")]
    pub source_output: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// One declared node output key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputBinding {
    pub key: String,
}

/// A node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Node kind, e.g. "message", "player_turn", "loop".
    #[serde(rename = "component_type")]
    pub kind: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
    #[serde(default)]
    pub outputs: Vec<OutputBinding>,
}

/// A condition attached to an outgoing edge of a conditional node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeCondition {
    pub target: String,
    pub key: String,
    pub value: Value,
    #[serde(default = "default_operator")]
    pub operator: String,
}

fn default_operator() -> String {
    "==".to_string()
}

/// A directed edge. Conditional edges carry the condition evaluated by
/// their source node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub condition: Option<ConditionSpec>,
}

/// The condition half of a conditional edge as written in templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub key: String,
    pub value: Value,
    #[serde(default = "default_operator")]
    pub operator: String,
}

/// A complete workflow graph as loaded from a JSON template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub game_type: String,
    pub start_node: String,
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

impl WorkflowDefinition {
    /// Parses a definition from JSON and validates its graph references.
    pub fn from_json(raw: &str) -> Result<Self, ParleyError> {
        let definition: WorkflowDefinition = serde_json::from_str(raw)?;
        definition.validate()?;
        Ok(definition)
    }

    fn validate(&self) -> Result<(), ParleyError> {
        let ids: HashMap<&str, ()> =
            self.nodes.iter().map(|n| (n.id.as_str(), ())).collect();
        if ids.len() != self.nodes.len() {
            return Err(ParleyError::Workflow(format!(
                "workflow '{}' has duplicate node ids",
                self.id
            )));
        }
        if !ids.contains_key(self.start_node.as_str()) {
            return Err(ParleyError::Workflow(format!(
                "workflow '{}' start node '{}' not defined",
                self.id, self.start_node
            )));
        }
        for edge in &self.edges {
            if !ids.contains_key(edge.source.as_str())
                || !ids.contains_key(edge.target.as_str())
            {
                return Err(ParleyError::Workflow(format!(
                    "workflow '{}' edge {} -> {} references an unknown node",
                    self.id, edge.source, edge.target
                )));
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Plain (unconditional) successors of a node, in edge order.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.source == id && e.condition.is_none())
            .map(|e| e.target.as_str())
            .collect()
    }

    /// Edge conditions attached to a node's outgoing conditional edges.
    pub fn edge_conditions(&self, id: &str) -> Vec<EdgeCondition> {
        self.edges
            .iter()
            .filter(|e| e.source == id)
            .filter_map(|e| {
                e.condition.as_ref().map(|c| EdgeCondition {
                    target: e.target.clone(),
                    key: c.key.clone(),
                    value: c.value.clone(),
                    operator: c.operator.clone(),
                })
            })
            .collect()
    }
}

/// A directory of workflow templates, one JSON file per definition,
/// loaded once at startup.
pub struct WorkflowLibrary {
    definitions: HashMap<String, WorkflowDefinition>,
}

impl WorkflowLibrary {
    pub fn empty() -> Self {
        Self {
            definitions: HashMap::new(),
        }
    }

    /// Loads every `*.json` template under `dir`. Files that fail to
    /// parse are skipped with a warning so one broken template does not
    /// take the library down.
    pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ParleyError> {
        let dir = dir.as_ref();
        let mut definitions = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| ParleyError::Workflow(format!("reading {}: {e}", dir.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ParleyError::Workflow(format!("reading {}: {e}", dir.display())))?
        {
            let path: PathBuf = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ParleyError::Workflow(format!("reading {}: {e}", path.display())))?;
            match WorkflowDefinition::from_json(&raw) {
                Ok(definition) => {
                    info!(workflow = %definition.id, path = %path.display(), "loaded workflow template");
                    definitions.insert(definition.id.clone(), definition);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unparseable workflow template");
                }
            }
        }
        Ok(Self { definitions })
    }

    pub fn insert(&mut self, definition: WorkflowDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowDefinition> {
        self.definitions.get(id)
    }

    /// Template ids, sorted for stable listings.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
