// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The built-in node kinds and their factory.

mod ai_player_speak;
mod conditional;
mod function_tool;
mod game_state;
mod loop_node;
mod message;
mod player_turn;

pub use ai_player_speak::AiPlayerSpeakNode;
pub use conditional::ConditionalNode;
pub use function_tool::FunctionToolNode;
pub use game_state::GameStateNode;
pub use loop_node::LoopNode;
pub use message::MessageNode;
pub use player_turn::PlayerTurnNode;

use parley_core::ParleyError;

use crate::graph::{EdgeCondition, NodeDefinition};
use crate::node::WorkflowNode;

/// Builds a node from its definition. `conditions` are the conditions of
/// the node's outgoing conditional edges; only `conditional` nodes use
/// them.
pub fn build(
    definition: &NodeDefinition,
    conditions: Vec<EdgeCondition>,
) -> Result<Box<dyn WorkflowNode>, ParleyError> {
    let node: Box<dyn WorkflowNode> = match definition.kind.as_str() {
        "message" => Box::new(MessageNode::new(&definition.id, &definition.config)),
        "player_turn" => Box::new(PlayerTurnNode::new(&definition.id, &definition.config)),
        "conditional" => Box::new(ConditionalNode::new(&definition.id, conditions)),
        "game_state" => Box::new(GameStateNode::new(&definition.id, &definition.config)),
        "loop" => Box::new(LoopNode::new(&definition.id, &definition.config)?),
        "ai_player_speak" => Box::new(AiPlayerSpeakNode::new(&definition.id, &definition.config)),
        "function_tool" => Box::new(FunctionToolNode::new(
            &definition.id,
            &definition.config,
            definition.inputs.clone(),
            definition.outputs.clone(),
        )),
        other => {
            return Err(ParleyError::Workflow(format!(
                "unknown node kind '{other}' for node '{}'",
                definition.id
            )))
        }
    };
    Ok(node)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use parley_catalog::manager::CacheFlags;
    use parley_catalog::CatalogManager;
    use parley_core::traits::ConfigSource;
    use parley_core::ParleyError;
    use parley_game::GameAgent;
    use parley_llm::{AccountedProvider, AdapterFactory};
    use parley_test_utils::{
        memory_store, sample_model, sample_role, FakeConfigSource, MockProvider,
    };
    use parley_tools::ToolRegistry;
    use parley_usage::{UsageRecord, UsageSink};

    use crate::node::NodeServices;

    pub struct NullSink;

    #[async_trait]
    impl UsageSink for NullSink {
        async fn record_usage(&self, _record: &UsageRecord) -> Result<(), ParleyError> {
            Ok(())
        }
    }

    fn services_from(source: Arc<FakeConfigSource>) -> NodeServices {
        let catalog = Arc::new(CatalogManager::new(
            memory_store(),
            "knowleadge_api:",
            source as Arc<dyn ConfigSource>,
            CacheFlags::default(),
        ));
        NodeServices {
            catalog: Arc::clone(&catalog),
            adapters: Arc::new(AdapterFactory::new(catalog, Arc::new(NullSink))),
            tools: Arc::new(ToolRegistry::new()),
            default_model_id: "mock-model".into(),
        }
    }

    /// Services over an empty catalog, enough for nodes that never touch
    /// roles or models.
    pub fn bare_services() -> NodeServices {
        services_from(FakeConfigSource::new())
    }

    /// Services whose catalog resolves the `npc` role and `mock-model`.
    pub async fn seeded_services() -> NodeServices {
        services_from(FakeConfigSource::seeded().await)
    }

    /// A live agent backed by a scripted mock provider.
    pub fn mock_agent(identity: &str, mock: MockProvider, session_id: &str) -> GameAgent {
        let provider =
            AccountedProvider::new(Arc::new(mock), sample_model("mock-model", 1), Arc::new(NullSink))
                .for_session(session_id);
        GameAgent::new(identity, sample_role(identity), "mock-model", provider)
    }
}
