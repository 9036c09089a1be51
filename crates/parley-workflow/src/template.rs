// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `{{var}}` template rendering over node inputs.
//!
//! Inputs are flattened with dotted prefixes before substitution, and
//! the fields of `state` / `game_state` objects are also promoted to the
//! top level so templates can say `{{round}}` instead of
//! `{{state.round}}`. Missing variables render as empty strings with a
//! warning rather than failing the node.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use tracing::warn;

use crate::value::as_text;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // The pattern is a literal, it cannot fail to compile.
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap_or_else(|_| unreachable!()))
}

/// Flattens nested objects into dotted keys, promoting `state` and
/// `game_state` fields to the top level.
pub fn flatten(inputs: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    flatten_into(&mut flat, "", inputs);
    for container in ["state", "game_state"] {
        if let Some(Value::Object(fields)) = inputs.get(container) {
            for (key, value) in fields {
                flat.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: &str, map: &Map<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Value::Object(nested) = value {
            flatten_into(flat, &path, nested);
        }
        flat.insert(path, value.clone());
    }
}

/// Renders `{{var}}` placeholders from `inputs`. Non-string values are
/// JSON-rendered; unknown variables become empty strings.
pub fn render(template: &str, inputs: &Map<String, Value>) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    let flat = flatten(inputs);
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            match flat.get(name) {
                Some(value) => as_text(value),
                None => {
                    warn!(variable = name, "template variable not found");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Variable names referenced by a template, in order of appearance.
pub fn variables(template: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs() -> Map<String, Value> {
        match json!({
            "name": "alice",
            "score": 42,
            "state": {"round": 3, "phase": "guessing"},
            "detail": {"inner": {"deep": "found"}}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn substitutes_simple_variables() {
        assert_eq!(render("hello {{name}}", &inputs()), "hello alice");
        assert_eq!(render("score: {{score}}", &inputs()), "score: 42");
    }

    #[test]
    fn state_fields_are_promoted() {
        assert_eq!(render("round {{round}}", &inputs()), "round 3");
        assert_eq!(render("round {{state.round}}", &inputs()), "round 3");
    }

    #[test]
    fn nested_paths_use_dots() {
        assert_eq!(render("{{detail.inner.deep}}", &inputs()), "found");
    }

    #[test]
    fn missing_variables_render_empty() {
        assert_eq!(render("[{{ghost}}]", &inputs()), "[]");
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        assert_eq!(render("hi {{ name }}", &inputs()), "hi alice");
    }

    #[test]
    fn literal_text_passes_through() {
        assert_eq!(render("no placeholders here", &inputs()), "no placeholders here");
    }

    #[test]
    fn lists_template_variables() {
        assert_eq!(
            variables("{{a}} and {{ b.c }}"),
            vec!["a".to_string(), "b.c".to_string()]
        );
    }
}
