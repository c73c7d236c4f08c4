// src/nodes/vector.rs
//
// =============================================================================
// FLOWRT: VECTOR_{INSERT,SEARCH,UPDATE,DELETE} NODE EXECUTOR
// =============================================================================
//
// One executor handles all four vector-store node kinds — they share a
// config shape (`VectorConfig`) and differ only in which `VectorOperation`
// they ask the provider client to perform.

use super::NodeExecutor;
use crate::collaborators::{Collaborators, VectorOperation};
use crate::error::FlowError;
use crate::flow::{Node, NodeKind, VectorPayload};
use crate::registry::Registry;
use async_trait::async_trait;
use serde_json::Value;

pub struct VectorExecutor;

#[async_trait]
impl NodeExecutor for VectorExecutor {
    async fn execute(
        &self,
        node: &Node,
        _registry: &dyn Registry,
        collaborators: &Collaborators,
        flow_id: &str,
    ) -> Result<Value, FlowError> {
        let payload: VectorPayload = serde_json::from_value(node.payload.clone()).map_err(|e| FlowError::Runtime {
            node_id: node.id.clone(),
            cause: anyhow::anyhow!("invalid vector node payload: {e}"),
        })?;

        log::debug!("flow '{flow_id}': node '{}' calling provider '{}'", node.id, payload.config.provider);

        let operation = match node.kind {
            NodeKind::VectorInsert => VectorOperation::Insert,
            NodeKind::VectorSearch => VectorOperation::Search,
            NodeKind::VectorUpdate => VectorOperation::Update,
            NodeKind::VectorDelete => VectorOperation::Delete,
            _ => unreachable!("VectorExecutor only registered for VECTOR_* kinds"),
        };

        let request = serde_json::json!({
            "index_name": payload.config.index_name,
            "namespace": payload.config.namespace,
            "top_k": payload.config.top_k,
            "similarity_threshold": payload.config.similarity_threshold,
            "filter": payload.config.filter,
            "input": payload.input,
        });

        collaborators
            .provider
            .vector_call(&payload.config.provider, operation, request)
            .await
            .map_err(|cause| FlowError::Runtime {
                node_id: node.id.clone(),
                cause,
            })
    }
}
