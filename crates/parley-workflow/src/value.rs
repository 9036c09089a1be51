// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dotted-path value resolution over the workflow context, and the
//! operator set used by conditional edges and conditional loops.
//!
//! Templates written against an evolving context are forgiving by
//! design: several legacy spellings (`gameState.`, `game_state.`) remap
//! to the canonical `state.` prefix, node references fall through to
//! component lookups, and an unresolvable path degrades to its last
//! segment at the root before giving up.

use serde_json::{Map, Value};
use tracing::warn;

/// Resolves `path` against context data and node results.
///
/// Lookup layers, in order:
/// 1. `gameState.` / `game_state.` prefixes remap to `state.`.
/// 2. `node_<id>.field` reads from that node's result, then falls back
///    to well-known collections (`players`, `characters`) under the
///    state, then to the root.
/// 3. A direct dotted walk over `data`.
/// 4. `state.x` falls back to `global.x`.
/// 5. The last path segment looked up at the root.
pub fn resolve(data: &Map<String, Value>, node_results: &Map<String, Value>, path: &str) -> Option<Value> {
    let path = remap_state_prefix(path);

    if let Some(rest) = path.strip_prefix("node_") {
        if let Some(value) = resolve_node_reference(data, node_results, rest) {
            return Some(value);
        }
    }

    if let Some(value) = walk(data, &path) {
        return Some(value);
    }

    if let Some(rest) = path.strip_prefix("state.") {
        if let Some(value) = walk(data, &format!("global.{rest}")) {
            return Some(value);
        }
    }

    // Last resort: the final segment at the root.
    let last = path.rsplit('.').next().unwrap_or(&path);
    if last != path {
        if let Some(value) = data.get(last) {
            return Some(value.clone());
        }
    }

    None
}

/// Like [`resolve`], returning `default` (with a warning) when nothing
/// matches.
pub fn resolve_or(
    data: &Map<String, Value>,
    node_results: &Map<String, Value>,
    path: &str,
    default: Value,
) -> Value {
    match resolve(data, node_results, path) {
        Some(value) => value,
        None => {
            warn!(path, "workflow value not found, using default");
            default
        }
    }
}

fn remap_state_prefix(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("gameState.") {
        format!("state.{rest}")
    } else if let Some(rest) = path.strip_prefix("game_state.") {
        format!("state.{rest}")
    } else {
        path.to_string()
    }
}

/// `<id>.field` (the `node_` prefix already stripped): node results
/// first, then component collections, then the bare field at the root.
fn resolve_node_reference(
    data: &Map<String, Value>,
    node_results: &Map<String, Value>,
    reference: &str,
) -> Option<Value> {
    let (node_id, field) = reference.split_once('.')?;

    if let Some(result) = node_results.get(node_id) {
        if let Some(value) = result.get(field) {
            return Some(value.clone());
        }
    }

    if matches!(field, "players" | "characters") {
        for container in ["state", "game_state", "gameState"] {
            if let Some(value) = data.get(container).and_then(|c| c.get(field)) {
                return Some(value.clone());
            }
        }
    }

    data.get(field).cloned()
}

fn walk(data: &Map<String, Value>, path: &str) -> Option<Value> {
    let mut current: Option<&Value> = None;
    for segment in path.split('.') {
        current = match current {
            None => data.get(segment),
            Some(value) => value.get(segment),
        };
        current?;
    }
    current.cloned()
}

/// Evaluates `actual <op> expected` for the conditional operator set.
///
/// `==`/`!=` compare loosely (numbers by value, everything else by
/// string form); ordering operators compare numerically; `in`/`not_in`
/// test membership in an array or substring containment.
pub fn compare(operator: &str, actual: &Value, expected: &Value) -> bool {
    match operator {
        "==" => loose_eq(actual, expected),
        "!=" => !loose_eq(actual, expected),
        ">" | "<" | ">=" | "<=" => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(b)) => match operator {
                ">" => a > b,
                "<" => a < b,
                ">=" => a >= b,
                _ => a <= b,
            },
            _ => false,
        },
        "in" => contains(expected, actual),
        "not_in" => !contains(expected, actual),
        "contains" => contains(actual, expected),
        other => {
            warn!(operator = other, "unknown conditional operator");
            false
        }
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    as_text(a) == as_text(b)
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::String(s) => s.contains(&as_text(needle)),
        _ => false,
    }
}

/// Loose numeric coercion: numbers directly, numeric strings parsed.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose boolean coercion: booleans directly, "true/yes/1/t/y" strings
/// (case-insensitive), nonzero numbers.
pub fn as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1" | "t" | "y")
        }
        _ => false,
    }
}

/// String form used for loose comparison and template rendering:
/// strings unquoted, everything else compact JSON.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
