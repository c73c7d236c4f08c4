// src/nodes/for_each.rs
//
// =============================================================================
// FLOWRT: FOR_EACH NODE — ITERATION PLANNING (§4.8)
// =============================================================================
//
// Like CONDITION, FOR_EACH doesn't produce a leaf value directly — it drives
// the flow executor through its body once per item, each time behind a
// fresh `ScopedRegistry` (§4.3). This module only owns turning the
// (already-resolved) `input.items` value into the ordered list of items to
// iterate; the flow executor owns building scopes and recursing into
// `each_nodes`.

use crate::error::FlowError;
use crate::flow::ForEachPayload;
use serde_json::Value;

/// Non-array `items` is a runtime error rather than an empty loop — a flow
/// author who got the type wrong needs to see that immediately rather than
/// silently no-op.
pub fn iteration_items(node_id: &str, payload: &ForEachPayload) -> Result<Vec<Value>, FlowError> {
    payload
        .input
        .items
        .as_array()
        .cloned()
        .ok_or_else(|| FlowError::Type {
            node_id: node_id.to_string(),
            variable_id: "input.items".to_string(),
            expected: "array".to_string(),
            found: json_kind(&payload.input.items),
        })
}

fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
