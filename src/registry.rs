// src/registry.rs
//
// =============================================================================
// FLOWRT: STATE REGISTRY (C3)
// =============================================================================
//
// Holds two maps for the lifetime of one flow run: declared variables and
// recorded node outputs. Every read a node executor or the variable resolver
// performs goes through `Registry::resolve_expression`, which is the single
// place `{{head.tail...}}` grammar meets actual stored state.
//
// A flow runs its nodes strictly sequentially (no two nodes mutate the
// registry concurrently), so interior mutability here only needs a `Mutex`
// for `Send + Sync` — it's never held across an `.await`.

use crate::error::FlowError;
use crate::flow::VariableType;
use crate::collaborators::FileStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Navigates a dotted tail path into a JSON value. Numeric path segments
/// index into arrays; everything else is an object-key lookup. Returns
/// `None` the moment a segment can't be resolved — callers treat that as
/// "reference unresolved", not an error.
pub fn navigate(value: &Value, tail: &[String]) -> Option<Value> {
    let mut cur = value.clone();
    for segment in tail {
        cur = match &cur {
            Value::Object(map) => map.get(segment)?.clone(),
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?.clone()
            }
            _ => return None,
        };
    }
    Some(cur)
}

/// The object-safe contract both the root registry and the For-Each scoped
/// overlay implement. Node executors and the resolver only ever hold a
/// `&dyn Registry`.
pub trait Registry: Send + Sync {
    fn get_variable(&self, id: &str) -> Option<Value>;
    fn has_variable(&self, id: &str) -> bool;
    fn set_variable(&self, id: &str, value: Value) -> Result<(), FlowError>;

    fn get_node_output(&self, id: &str) -> Option<Value>;
    fn has_node_output(&self, id: &str) -> bool;
    fn set_node_output(&self, id: &str, value: Value);

    /// Resolves one parsed `{{head.tail...}}` reference against this
    /// registry's view of the world: node outputs first, then variables.
    fn resolve_expression(&self, head: &str, tail: &[String]) -> Option<Value> {
        if self.has_node_output(head) {
            let out = self.get_node_output(head)?;
            return navigate(&out, tail);
        }
        if self.has_variable(head) {
            let var = self.get_variable(head)?;
            return navigate(&var, tail);
        }
        None
    }
}

fn value_matches_type(value: &Value, var_type: VariableType) -> bool {
    match var_type {
        VariableType::String => value.is_string(),
        VariableType::Number => value.is_number(),
        VariableType::Boolean => value.is_boolean(),
        VariableType::Array => value.is_array(),
        VariableType::Object => value.is_object(),
        // A `file` variable is stored as the opaque handle id the file
        // store hands back — on the wire that's always a string.
        VariableType::File => value.is_string(),
    }
}

fn type_name(var_type: VariableType) -> &'static str {
    match var_type {
        VariableType::String => "string",
        VariableType::Number => "number",
        VariableType::Boolean => "boolean",
        VariableType::Array => "array",
        VariableType::Object => "object",
        VariableType::File => "file",
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// The flow-scoped root registry: one instance per flow run, seeded with
/// the flow's declared variables and their initial values.
pub struct RootRegistry {
    vars: Mutex<HashMap<String, Value>>,
    var_types: HashMap<String, VariableType>,
    outputs: Mutex<HashMap<String, Value>>,
    files: Arc<dyn FileStore>,
}

impl RootRegistry {
    pub fn new(
        initial_vars: HashMap<String, Value>,
        var_types: HashMap<String, VariableType>,
        files: Arc<dyn FileStore>,
    ) -> Self {
        Self {
            vars: Mutex::new(initial_vars),
            var_types,
            outputs: Mutex::new(HashMap::new()),
            files,
        }
    }

    /// Validates a candidate value against its variable's declared type
    /// before it's accepted, per the flow schema's variable type contract.
    /// `file`-typed values that aren't already known handle ids are
    /// registered with the file store and rewritten to the handle id.
    fn coerce_and_check(&self, id: &str, value: Value) -> Result<Value, FlowError> {
        let Some(&var_type) = self.var_types.get(id) else {
            return Ok(value);
        };

        if var_type == VariableType::File {
            if let Value::String(s) = &value {
                if self.files.has_file(s) {
                    return Ok(value);
                }
                let handle = self
                    .files
                    .register_file(s)
                    .map_err(|cause| FlowError::Runtime {
                        node_id: id.to_string(),
                        cause,
                    })?;
                return Ok(Value::String(handle.id));
            }
            return Err(FlowError::Type {
                node_id: id.to_string(),
                variable_id: id.to_string(),
                expected: "file".to_string(),
                found: value_kind(&value).to_string(),
            });
        }

        if value_matches_type(&value, var_type) {
            Ok(value)
        } else {
            Err(FlowError::Type {
                node_id: id.to_string(),
                variable_id: id.to_string(),
                expected: type_name(var_type).to_string(),
                found: value_kind(&value).to_string(),
            })
        }
    }
}

impl Registry for RootRegistry {
    fn get_variable(&self, id: &str) -> Option<Value> {
        self.vars.lock().unwrap().get(id).cloned()
    }

    fn has_variable(&self, id: &str) -> bool {
        self.vars.lock().unwrap().contains_key(id)
    }

    fn set_variable(&self, id: &str, value: Value) -> Result<(), FlowError> {
        let checked = self.coerce_and_check(id, value)?;
        self.vars.lock().unwrap().insert(id.to_string(), checked);
        Ok(())
    }

    fn get_node_output(&self, id: &str) -> Option<Value> {
        self.outputs.lock().unwrap().get(id).cloned()
    }

    fn has_node_output(&self, id: &str) -> bool {
        self.outputs.lock().unwrap().contains_key(id)
    }

    fn set_node_output(&self, id: &str, value: Value) {
        self.outputs.lock().unwrap().insert(id.to_string(), value);
    }
}

/// A per-iteration view handed to a For-Each body (§4.8). Delegates
/// variable reads/writes unchanged to the parent, binds `each_key` and
/// `each_key_index` to the current item, and keeps a private node-output
/// store so sibling body nodes can reference each other inside one
/// iteration without leaking into the parent or the next iteration.
pub struct ScopedRegistry {
    parent: Arc<dyn Registry>,
    each_key: String,
    index_key: String,
    item: Value,
    index: usize,
    local_outputs: Mutex<HashMap<String, Value>>,
}

impl ScopedRegistry {
    pub fn new(parent: Arc<dyn Registry>, each_key: &str, item: Value, index: usize) -> Self {
        Self {
            parent,
            each_key: each_key.to_string(),
            index_key: format!("{each_key}_index"),
            item,
            index,
            local_outputs: Mutex::new(HashMap::new()),
        }
    }
}

impl Registry for ScopedRegistry {
    fn get_variable(&self, id: &str) -> Option<Value> {
        self.parent.get_variable(id)
    }

    fn has_variable(&self, id: &str) -> bool {
        self.parent.has_variable(id)
    }

    fn set_variable(&self, id: &str, value: Value) -> Result<(), FlowError> {
        self.parent.set_variable(id, value)
    }

    fn get_node_output(&self, id: &str) -> Option<Value> {
        self.local_outputs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .or_else(|| self.parent.get_node_output(id))
    }

    fn has_node_output(&self, id: &str) -> bool {
        self.local_outputs.lock().unwrap().contains_key(id) || self.parent.has_node_output(id)
    }

    /// Writes to both the private per-iteration store (so later sibling
    /// nodes in *this* iteration see it immediately) and the parent
    /// registry (so outer hooks, end-of-flow output collection, and
    /// diagnostics can see it too) — §4.8 step 1's `setNodeOutput` bullet.
    fn set_node_output(&self, id: &str, value: Value) {
        self.local_outputs
            .lock()
            .unwrap()
            .insert(id.to_string(), value.clone());
        self.parent.set_node_output(id, value);
    }

    fn resolve_expression(&self, head: &str, tail: &[String]) -> Option<Value> {
        if head == self.each_key {
            return navigate(&self.item, tail);
        }
        if head == self.index_key {
            return if tail.is_empty() {
                Some(Value::from(self.index))
            } else {
                None
            };
        }
        if self.local_outputs.lock().unwrap().contains_key(head) {
            let out = self.local_outputs.lock().unwrap().get(head).cloned()?;
            return navigate(&out, tail);
        }
        self.parent.resolve_expression(head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryFileStore;

    fn root() -> RootRegistry {
        let mut types = HashMap::new();
        types.insert("name".to_string(), VariableType::String);
        types.insert("count".to_string(), VariableType::Number);
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), Value::String("ada".into()));
        RootRegistry::new(vars, types, Arc::new(InMemoryFileStore::new()))
    }

    #[test]
    fn resolves_variable_before_missing_output() {
        let reg = root();
        assert_eq!(
            reg.resolve_expression("name", &[]),
            Some(Value::String("ada".into()))
        );
    }

    #[test]
    fn node_output_takes_precedence_and_navigates() {
        let reg = root();
        reg.set_node_output("n1", serde_json::json!({"output": {"text": "hi"}}));
        assert_eq!(
            reg.resolve_expression("n1", &["output".into(), "text".into()]),
            Some(Value::String("hi".into()))
        );
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let reg = root();
        let err = reg.set_variable("count", Value::String("oops".into()));
        assert!(matches!(err, Err(FlowError::Type { .. })));
    }

    #[test]
    fn scoped_registry_binds_each_key_and_index() {
        let parent: Arc<dyn Registry> = Arc::new(root());
        let scoped = ScopedRegistry::new(parent, "item", Value::String("row-2".into()), 1);
        assert_eq!(
            scoped.resolve_expression("item", &[]),
            Some(Value::String("row-2".into()))
        );
        assert_eq!(
            scoped.resolve_expression("item_index", &[]),
            Some(Value::from(1))
        );
    }

    #[test]
    fn scoped_registry_delegates_variables_and_mirrors_outputs_to_parent() {
        let parent: Arc<dyn Registry> = Arc::new(root());
        let scoped = ScopedRegistry::new(Arc::clone(&parent), "item", Value::Null, 0);
        assert!(scoped.has_variable("name"));
        scoped.set_node_output("body1", serde_json::json!({"output": 1}));
        assert!(scoped.has_node_output("body1"));
        assert!(parent.has_node_output("body1"));
    }

    #[test]
    fn fresh_iteration_scope_does_not_see_previous_iterations_local_writes() {
        let parent: Arc<dyn Registry> = Arc::new(root());
        let first = ScopedRegistry::new(Arc::clone(&parent), "item", Value::from(1), 0);
        first.set_node_output("body1", serde_json::json!({"output": "iter0"}));

        let second = ScopedRegistry::new(Arc::clone(&parent), "item", Value::from(2), 1);
        // body1 ran again in iteration 1 and overwrote the shared parent
        // record — the new scope's *local* store starts empty regardless.
        assert!(!second.has_node_output("body2"));
        assert_eq!(
            second.resolve_expression("body1", &["output".into()]),
            Some(Value::String("iter0".into()))
        );
    }
}
