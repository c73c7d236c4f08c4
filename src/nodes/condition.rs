// src/nodes/condition.rs
//
// =============================================================================
// FLOWRT: CONDITION NODE — BRANCH SELECTION (§4.6, §4.7)
// =============================================================================
//
// Not a `NodeExecutor`: a CONDITION node doesn't produce a leaf value, it
// selects a subtree of nodes for the flow executor to run next. This module
// only owns branch-matching; the flow executor drives the actual recursion
// into the selected branch's nodes (same dispatch used for top-level nodes).

use super::apply_operator;
use crate::error::FlowError;
use crate::flow::{Branch, ConditionPayload, Node, DEFAULT_BRANCH};
use serde_json::Value;

/// Picks the first non-default branch whose `condition` operator matches
/// the (already variable-resolved) `switch_value`, checked in the branches'
/// JSON declaration order (§4.6) — `ConditionPayload::branches` is an
/// `IndexMap`, so iteration order here is exactly insertion order. Falls
/// back to the `default` branch, then to "no branch selected" if neither
/// exists.
pub fn select_branch<'a>(
    node_id: &str,
    payload: &'a ConditionPayload,
) -> Result<Option<(&'a str, &'a Branch)>, FlowError> {
    let switch_value: &Value = &payload.input.switch_value;

    for (name, branch) in &payload.branches {
        if name == DEFAULT_BRANCH {
            continue;
        }
        let (Some(op), Some(expected)) = (&branch.condition, &branch.value) else {
            continue;
        };
        if apply_operator(node_id, op, switch_value, expected)? {
            return Ok(Some((name.as_str(), branch)));
        }
    }

    if let Some(default) = payload.branches.get(DEFAULT_BRANCH) {
        return Ok(Some((DEFAULT_BRANCH, default)));
    }

    Ok(None)
}

pub fn selected_nodes(branch: &Branch) -> &[Node] {
    &branch.nodes
}
