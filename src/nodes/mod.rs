// src/nodes/mod.rs
//
// =============================================================================
// FLOWRT: NODE EXECUTORS (C5)
// =============================================================================
//
// The hexagonal port for "leaf" processing nodes — everything except the two
// control-flow kinds (CONDITION, FOR_EACH), which the flow executor runs
// directly since they need to recurse back into node dispatch for their
// nested bodies. The engine dispatches through one boxed trait object per
// node kind and never knows which concrete implementation answered.

pub mod condition;
pub mod document_splitter;
pub mod for_each;
pub mod llm;
pub mod text_embedding;
pub mod update_variable;
pub mod vector;

use crate::collaborators::Collaborators;
use crate::error::FlowError;
use crate::flow::{Node, NodeKind};
use crate::registry::Registry;
use async_trait::async_trait;
use serde_json::Value;

/// A leaf node executor. Receives the node with its payload already
/// resolved against the registry (every `{{...}}` substituted in), the owning
/// flow run's id (the context bundle's `flowId`, for logging/provider
/// tracing), and returns the value that becomes visible downstream as
/// `{{<node.id>.output...}}`.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node: &Node,
        registry: &dyn Registry,
        collaborators: &Collaborators,
        flow_id: &str,
    ) -> Result<Value, FlowError>;
}

/// Shared operator semantics used by both the CONDITION node's branch
/// matching and UPDATE_VARIABLE's `filter` operation (§4.7).
pub fn apply_operator(
    node_id: &str,
    operator: &str,
    left: &Value,
    right: &Value,
) -> Result<bool, FlowError> {
    match operator {
        "equals" => Ok(values_equal(left, right)),
        "not_equals" => Ok(!values_equal(left, right)),
        "greater_than" => Ok(compare_numeric(left, right).map(|o| o.is_gt()).unwrap_or(false)),
        "less_than" => Ok(compare_numeric(left, right).map(|o| o.is_lt()).unwrap_or(false)),
        "contains" => Ok(contains(left, right)),
        other => Err(FlowError::UnknownOperator {
            node_id: node_id.to_string(),
            operator: other.to_string(),
        }),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a == b;
    }
    left == right
}

fn compare_numeric(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    let a = left.as_f64()?;
    let b = right.as_f64()?;
    a.partial_cmp(&b)
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().map(|n| s.contains(n)).unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

pub struct NodeExecutorFactory;

impl NodeExecutorFactory {
    /// Returns the leaf executor for a node kind, or `None` for the two
    /// control-flow kinds the flow executor handles itself.
    pub fn get(kind: &NodeKind) -> Option<Box<dyn NodeExecutor>> {
        match kind {
            NodeKind::Llm => Some(Box::new(llm::LlmExecutor)),
            NodeKind::DocumentSplitter => Some(Box::new(document_splitter::DocumentSplitterExecutor)),
            NodeKind::TextEmbedding => Some(Box::new(text_embedding::TextEmbeddingExecutor)),
            NodeKind::VectorInsert | NodeKind::VectorSearch | NodeKind::VectorUpdate | NodeKind::VectorDelete => {
                Some(Box::new(vector::VectorExecutor))
            }
            NodeKind::UpdateVariable => Some(Box::new(update_variable::UpdateVariableExecutor)),
            NodeKind::Condition | NodeKind::ForEach => None,
        }
    }
}
