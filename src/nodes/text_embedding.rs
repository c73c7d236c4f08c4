// src/nodes/text_embedding.rs
//
// =============================================================================
// FLOWRT: TEXT_EMBEDDING NODE EXECUTOR
// =============================================================================
//
// Accepts exactly one of `text` (single string), `texts` (array of strings)
// or `items` (array of objects carrying a text field elsewhere) and routes
// it to the provider's embedding endpoint.

use super::NodeExecutor;
use crate::collaborators::Collaborators;
use crate::error::FlowError;
use crate::flow::{Node, TextEmbeddingPayload};
use crate::registry::Registry;
use async_trait::async_trait;
use serde_json::Value;

pub struct TextEmbeddingExecutor;

#[async_trait]
impl NodeExecutor for TextEmbeddingExecutor {
    async fn execute(
        &self,
        node: &Node,
        _registry: &dyn Registry,
        collaborators: &Collaborators,
        flow_id: &str,
    ) -> Result<Value, FlowError> {
        let payload: TextEmbeddingPayload =
            serde_json::from_value(node.payload.clone()).map_err(|e| FlowError::Runtime {
                node_id: node.id.clone(),
                cause: anyhow::anyhow!("invalid TEXT_EMBEDDING payload: {e}"),
            })?;

        log::debug!("flow '{flow_id}': node '{}' requesting embeddings", node.id);

        let request = if let Some(text) = &payload.input.text {
            serde_json::json!({ "text": text })
        } else if let Some(texts) = &payload.input.texts {
            serde_json::json!({ "texts": texts })
        } else if let Some(items) = &payload.input.items {
            serde_json::json!({ "items": items })
        } else {
            return Err(FlowError::Runtime {
                node_id: node.id.clone(),
                cause: anyhow::anyhow!(
                    "TEXT_EMBEDDING node requires one of input.text, input.texts, or input.items"
                ),
            });
        };

        collaborators
            .provider
            .embed(&payload.config.provider, &payload.config.model, request)
            .await
            .map_err(|cause| FlowError::Runtime {
                node_id: node.id.clone(),
                cause,
            })
    }
}
