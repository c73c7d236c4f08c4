// src/nodes/update_variable.rs
//
// =============================================================================
// FLOWRT: UPDATE_VARIABLE NODE EXECUTOR (§4.5)
// =============================================================================
//
// The workhorse node kind: every operation reads the targeted variable's
// current value, combines it with the node's (already-resolved) `value`
// payload, and writes the result back through the registry — which is also
// where the variable's declared type gets re-checked (§4.3).
//
// A target variable that hasn't been seen before is created rather than
// rejected, with a warning logged — flows commonly use Update-Variable to
// initialize an accumulator on its first pass through a For-Each body.
//
// `stringify_output` only changes anything for `join`/`append`, where the
// operand can be an object: true (their default) JSON-encodes it before
// concatenation; every other operation ignores the flag, since their
// natural result is already structured.

use super::{apply_operator, NodeExecutor};
use crate::collaborators::Collaborators;
use crate::error::FlowError;
use crate::flow::{Node, UpdateOp, UpdateVariablePayload};
use crate::registry::{navigate, Registry};
use async_trait::async_trait;
use serde_json::{Map, Value};

pub struct UpdateVariableExecutor;

#[async_trait]
impl NodeExecutor for UpdateVariableExecutor {
    async fn execute(
        &self,
        node: &Node,
        registry: &dyn Registry,
        _collaborators: &Collaborators,
        flow_id: &str,
    ) -> Result<Value, FlowError> {
        let payload: UpdateVariablePayload =
            serde_json::from_value(node.payload.clone()).map_err(|e| FlowError::Runtime {
                node_id: node.id.clone(),
                cause: anyhow::anyhow!("invalid UPDATE_VARIABLE payload: {e}"),
            })?;

        let existed = registry.has_variable(&payload.config.variable_id);
        if !existed {
            log::warn!(
                "flow '{flow_id}': node '{}': target variable '{}' has no prior value; creating it",
                node.id,
                payload.config.variable_id
            );
        }

        let current = registry
            .get_variable(&payload.config.variable_id)
            .unwrap_or(Value::Null);

        let new_value = apply_op(node, &payload, existed, &current)?;

        registry.set_variable(&payload.config.variable_id, new_value.clone())?;

        Ok(serde_json::json!({
            "variable_id": payload.config.variable_id,
            "previous_value": current,
            "new_value": new_value,
            "operation": op_name(payload.config.op),
            "resolved_input": payload.value,
        }))
    }
}

fn op_name(op: UpdateOp) -> &'static str {
    match op {
        UpdateOp::Update => "update",
        UpdateOp::Join => "join",
        UpdateOp::Append => "append",
        UpdateOp::Extract => "extract",
        UpdateOp::Pick => "pick",
        UpdateOp::Omit => "omit",
        UpdateOp::Map => "map",
        UpdateOp::Filter => "filter",
        UpdateOp::Slice => "slice",
        UpdateOp::Flatten => "flatten",
        UpdateOp::Concat => "concat",
    }
}

fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn render_operand(value: &Value, stringify_output: bool) -> Value {
    if stringify_output && (value.is_object() || value.is_array()) {
        Value::String(value.to_string())
    } else {
        value.clone()
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('.').filter(|s| !s.is_empty()).map(String::from).collect()
}

/// For `pick`/`omit`: the output key for a (possibly dotted) field path is
/// its final segment.
fn final_segment(path: &str) -> String {
    path.rsplit('.').next().unwrap_or(path).to_string()
}

fn delete_path(value: &mut Value, path: &[String]) {
    let Some((head, rest)) = path.split_first() else {
        return;
    };
    let Value::Object(map) = value else {
        return;
    };
    if rest.is_empty() {
        map.remove(head);
    } else if let Some(nested) = map.get_mut(head) {
        delete_path(nested, rest);
    }
}

fn type_error(node: &Node, variable_id: &str, expected: &str, value: &Value) -> FlowError {
    FlowError::Type {
        node_id: node.id.clone(),
        variable_id: variable_id.to_string(),
        expected: expected.to_string(),
        found: json_kind(value),
    }
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

fn as_array<'a>(node: &Node, variable_id: &str, value: &'a Value) -> Result<&'a Vec<Value>, FlowError> {
    value.as_array().ok_or_else(|| type_error(node, variable_id, "array", value))
}

/// The `append`/`concat` target: an array is used as-is, a variable that has
/// never been set defaults to an empty one, and anything else (a variable
/// that already holds a non-sequence value) is a type error rather than a
/// silent reset.
fn target_sequence(node: &Node, variable_id: &str, existed: bool, current: &Value) -> Result<Vec<Value>, FlowError> {
    match current {
        Value::Array(items) => Ok(items.clone()),
        Value::Null if !existed => Ok(Vec::new()),
        other => Err(type_error(node, variable_id, "array", other)),
    }
}

/// `existed` is whether `current` came from an actually-set variable rather
/// than the zero value `execute` substitutes for one that was never set —
/// `append`/`concat` need the distinction to tell "fresh accumulator" from
/// "target already holds something that isn't a sequence".
fn apply_op(node: &Node, payload: &UpdateVariablePayload, existed: bool, current: &Value) -> Result<Value, FlowError> {
    let cfg = &payload.config;
    let value = &payload.value;

    match cfg.op {
        UpdateOp::Update => Ok(value.clone()),

        UpdateOp::Join => {
            let stringify = cfg.stringify_output.unwrap_or(true);
            let sep = cfg.join_str.clone().unwrap_or_default();
            let left = stringify_value(&render_operand(current, stringify));
            let right = stringify_value(&render_operand(value, stringify));
            // No separator in front of the very first joined piece — an
            // empty/absent accumulator isn't itself a joined element.
            let joined = if left.is_empty() { right } else { format!("{left}{sep}{right}") };
            Ok(Value::String(joined))
        }

        UpdateOp::Append => {
            let mut target = target_sequence(node, &cfg.variable_id, existed, current)?;
            let stringify = cfg.stringify_output.unwrap_or(true);
            target.push(render_operand(value, stringify));
            Ok(Value::Array(target))
        }

        UpdateOp::Extract => {
            let items = as_array(node, &cfg.variable_id, value)?;
            let path = split_path(cfg.field_path.as_deref().unwrap_or(""));
            let extracted: Vec<Value> = items
                .iter()
                .filter_map(|item| navigate(item, &path))
                .collect();
            Ok(Value::Array(extracted))
        }

        UpdateOp::Pick => {
            let fields = cfg.fields.clone().unwrap_or_default();
            let pick_one = |obj: &Value| -> Value {
                let mut out = Map::new();
                for field in &fields {
                    let path = split_path(field);
                    if let Some(v) = navigate(obj, &path) {
                        out.insert(final_segment(field), v);
                    }
                }
                Value::Object(out)
            };
            match value.as_array() {
                Some(items) => Ok(Value::Array(items.iter().map(pick_one).collect())),
                None => Ok(pick_one(value)),
            }
        }

        UpdateOp::Omit => {
            let fields = cfg.fields.clone().unwrap_or_default();
            let omit_one = |obj: &Value| -> Value {
                let mut cloned = obj.clone();
                for field in &fields {
                    delete_path(&mut cloned, &split_path(field));
                }
                cloned
            };
            match value.as_array() {
                Some(items) => Ok(Value::Array(items.iter().map(omit_one).collect())),
                None => Ok(omit_one(value)),
            }
        }

        UpdateOp::Map => {
            let items = as_array(node, &cfg.variable_id, value)?;
            let mapping = cfg.mapping.clone().unwrap_or_default();
            let mapped = items
                .iter()
                .map(|item| {
                    let mut out = Map::new();
                    for (out_key, spec) in &mapping {
                        let resolved = match spec {
                            Value::String(source_path) => {
                                navigate(item, &split_path(source_path)).unwrap_or(Value::Null)
                            }
                            literal => literal.clone(),
                        };
                        out.insert(out_key.clone(), resolved);
                    }
                    Value::Object(out)
                })
                .collect();
            Ok(Value::Array(mapped))
        }

        UpdateOp::Filter => {
            let items = as_array(node, &cfg.variable_id, value)?;
            let cond = cfg.condition.as_ref().ok_or_else(|| FlowError::Runtime {
                node_id: node.id.clone(),
                cause: anyhow::anyhow!("'filter' operation requires a condition"),
            })?;
            let path = split_path(&cond.field);
            let mut out = Vec::new();
            for item in items {
                let field_value = navigate(item, &path).unwrap_or(Value::Null);
                if apply_operator(&node.id, &cond.operator, &field_value, &cond.value)? {
                    out.push(item.clone());
                }
            }
            Ok(Value::Array(out))
        }

        UpdateOp::Slice => {
            let items = as_array(node, &cfg.variable_id, value)?;
            let len = items.len() as i64;
            let resolve = |idx: Option<i64>, default: i64| -> usize {
                let raw = idx.unwrap_or(default);
                let normalized = if raw < 0 { (len + raw).max(0) } else { raw.min(len) };
                normalized as usize
            };
            let start = resolve(cfg.slice_start, 0);
            let end = resolve(cfg.slice_end, len).max(start);
            Ok(Value::Array(items[start..end.min(items.len())].to_vec()))
        }

        UpdateOp::Flatten => {
            let items = as_array(node, &cfg.variable_id, value)?;
            let mut out = Vec::new();
            for item in items {
                match item.as_array() {
                    Some(inner) => out.extend(inner.iter().cloned()),
                    None => out.push(item.clone()),
                }
            }
            Ok(Value::Array(out))
        }

        UpdateOp::Concat => {
            let mut base = target_sequence(node, &cfg.variable_id, existed, current)?;
            let extra = as_array(node, &cfg.variable_id, value)?;
            base.extend(extra.iter().cloned());
            Ok(Value::Array(base))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryFileStore;
    use crate::flow::{NodeKind, VariableType};
    use crate::registry::RootRegistry;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn node(payload: Value) -> Node {
        Node {
            id: "uv1".to_string(),
            kind: NodeKind::UpdateVariable,
            name: String::new(),
            payload,
        }
    }

    fn registry_with(id: &str, var_type: VariableType, initial: Value) -> RootRegistry {
        let mut types = HashMap::new();
        types.insert(id.to_string(), var_type);
        let mut vars = HashMap::new();
        vars.insert(id.to_string(), initial);
        RootRegistry::new(vars, types, Arc::new(InMemoryFileStore::new()))
    }

    #[tokio::test]
    async fn append_pushes_onto_array() {
        let reg = registry_with("acc", VariableType::Array, json!([1, 2]));
        let n = node(json!({
            "config": {"variable_id": "acc", "type": "append", "stringify_output": false},
            "value": 3
        }));
        UpdateVariableExecutor.execute(&n, &reg, &Collaborators::noop(), "test-flow").await.unwrap();
        assert_eq!(reg.get_variable("acc"), Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn for_each_style_append_produces_comma_joined_string() {
        let reg = registry_with("out", VariableType::String, json!(""));
        for i in 1..=5 {
            let n = node(json!({
                "config": {"variable_id": "out", "type": "join", "join_str": ","},
                "value": format!("N={i}")
            }));
            UpdateVariableExecutor.execute(&n, &reg, &Collaborators::noop(), "test-flow").await.unwrap();
        }
        assert_eq!(
            reg.get_variable("out"),
            Some(json!("N=1,N=2,N=3,N=4,N=5"))
        );
    }

    #[tokio::test]
    async fn pick_extracts_final_segment_of_dotted_path() {
        let reg = registry_with("people", VariableType::Array, json!([]));
        let n = node(json!({
            "config": {"variable_id": "people", "type": "pick", "fields": ["metadata.text"]},
            "value": [
                {"id": "a", "metadata": {"text": "x"}},
                {"id": "b", "metadata": {"text": "y"}}
            ]
        }));
        let out = UpdateVariableExecutor.execute(&n, &reg, &Collaborators::noop(), "test-flow").await.unwrap();
        assert_eq!(out["new_value"], json!([{"text": "x"}, {"text": "y"}]));
    }

    #[tokio::test]
    async fn filter_applies_nested_condition_operator() {
        let reg = registry_with("rows", VariableType::Array, json!([]));
        let n = node(json!({
            "config": {
                "variable_id": "rows",
                "type": "filter",
                "condition": {"field": "stats.score", "operator": "greater_than", "value": 5}
            },
            "value": [{"stats": {"score": 3}}, {"stats": {"score": 9}}]
        }));
        let out = UpdateVariableExecutor.execute(&n, &reg, &Collaborators::noop(), "test-flow").await.unwrap();
        assert_eq!(out["new_value"], json!([{"stats": {"score": 9}}]));
    }

    #[tokio::test]
    async fn append_onto_an_existing_non_array_value_is_a_type_error() {
        let reg = registry_with("acc", VariableType::String, json!("not an array"));
        let n = node(json!({
            "config": {"variable_id": "acc", "type": "append", "stringify_output": false},
            "value": 3
        }));
        let err = UpdateVariableExecutor
            .execute(&n, &reg, &Collaborators::noop(), "test-flow")
            .await
            .expect_err("appending onto a pre-existing scalar must fail");
        assert!(matches!(err, FlowError::Type { ref variable_id, .. } if variable_id == "acc"));
    }

    #[tokio::test]
    async fn creating_an_undeclared_target_does_not_error() {
        let reg = RootRegistry::new(HashMap::new(), HashMap::new(), Arc::new(InMemoryFileStore::new()));
        let n = node(json!({
            "config": {"variable_id": "fresh", "type": "update"},
            "value": 42
        }));
        let out = UpdateVariableExecutor.execute(&n, &reg, &Collaborators::noop(), "test-flow").await.unwrap();
        assert_eq!(out["new_value"], json!(42));
        assert_eq!(reg.get_variable("fresh"), Some(json!(42)));
    }
}
