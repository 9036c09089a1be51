// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tools the turtle-soup game registers with the model.
//!
//! These tools carry structure, not side effects: the model expresses a
//! puzzle or a judgment through the tool arguments and the runtime reads
//! the arguments straight off the tool call. `invoke` echoes the
//! validated arguments so a registry-driven execution path works too.

use async_trait::async_trait;
use parley_core::ParleyError;
use parley_tools::{Tool, ToolOutput};
use serde::Deserialize;
use serde_json::Value;

/// `create_soup(soup, answer)`: a puzzle surface and its hidden truth.
pub struct CreateSoupTool;

#[derive(Debug, Clone, Deserialize)]
pub struct SoupArgs {
    /// The puzzle surface shown to the players.
    pub soup: String,
    /// The hidden truth that resolves the surface.
    pub answer: String,
}

#[async_trait]
impl Tool for CreateSoupTool {
    fn name(&self) -> &str {
        "create_soup"
    }

    fn description(&self) -> &str {
        "Creates a lateral-thinking puzzle: a short surface story and the hidden truth behind it."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "soup": {
                    "type": "string",
                    "description": "The puzzle surface presented to the players"
                },
                "answer": {
                    "type": "string",
                    "description": "The full hidden truth that explains the surface"
                }
            },
            "required": ["soup", "answer"]
        })
    }

    async fn invoke(&self, input: Value) -> Result<ToolOutput, ParleyError> {
        let args: SoupArgs = serde_json::from_value(input)?;
        Ok(ToolOutput::ok(serde_json::to_string(&serde_json::json!({
            "soup": args.soup,
            "answer": args.answer,
        }))?))
    }
}

/// `function_judge_answer(is_solved, answer)`: the setter's verdict on a
/// player question or guess.
pub struct JudgeAnswerTool;

#[derive(Debug, Clone, Deserialize)]
pub struct JudgeArgs {
    /// 1 when the guess solves the puzzle, 0 otherwise.
    pub is_solved: i64,
    /// The setter's reply to relay to the players.
    pub answer: String,
}

#[async_trait]
impl Tool for JudgeAnswerTool {
    fn name(&self) -> &str {
        "function_judge_answer"
    }

    fn description(&self) -> &str {
        "Judges whether a guess solves the puzzle and gives the reply to relay to the players."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "is_solved": {
                    "type": "integer",
                    "description": "1 if the guess solves the puzzle, 0 otherwise"
                },
                "answer": {
                    "type": "string",
                    "description": "Reply to the player: yes, no, irrelevant, or the confirmation"
                }
            },
            "required": ["is_solved", "answer"]
        })
    }

    async fn invoke(&self, input: Value) -> Result<ToolOutput, ParleyError> {
        let args: JudgeArgs = serde_json::from_value(input)?;
        Ok(ToolOutput::ok(serde_json::to_string(&serde_json::json!({
            "is_solved": args.is_solved,
            "answer": args.answer,
        }))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_soup_echoes_arguments() {
        let output = CreateSoupTool
            .invoke(serde_json::json!({"soup": "A man dies.", "answer": "He was a sailor."}))
            .await
            .unwrap();
        assert!(!output.is_error);
        let parsed: Value = serde_json::from_str(&output.content).unwrap();
        assert_eq!(parsed["soup"], "A man dies.");
    }

    #[tokio::test]
    async fn judge_rejects_missing_fields() {
        let result = JudgeAnswerTool
            .invoke(serde_json::json!({"answer": "yes"}))
            .await;
        assert!(result.is_err());
    }
}
