// src/nodes/llm.rs
//
// =============================================================================
// FLOWRT: LLM NODE EXECUTOR (§4.4)
// =============================================================================
//
// Builds a provider request out of the (already variable-resolved)
// conversation, routes it through the tool-calling facade when the node
// declares MCP servers or tools, and shapes the provider's raw response down
// to exactly the fields the flow author declared in `output`.

use super::NodeExecutor;
use crate::collaborators::Collaborators;
use crate::error::FlowError;
use crate::flow::{LlmPayload, Node};
use crate::registry::Registry;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub struct LlmExecutor;

#[async_trait]
impl NodeExecutor for LlmExecutor {
    async fn execute(
        &self,
        node: &Node,
        _registry: &dyn Registry,
        collaborators: &Collaborators,
        flow_id: &str,
    ) -> Result<Value, FlowError> {
        let payload: LlmPayload = serde_json::from_value(node.payload.clone()).map_err(|e| FlowError::Runtime {
            node_id: node.id.clone(),
            cause: anyhow::anyhow!("invalid LLM payload: {e}"),
        })?;

        log::debug!(
            "flow '{flow_id}': node '{}' calling {}/{}",
            node.id,
            payload.config.provider,
            payload.config.model
        );

        let conversation = serde_json::json!({
            "messages": payload.messages,
            "max_tokens": payload.config.max_tokens,
            "temperature": payload.config.temperature,
            "output_schema": payload.output,
        });

        let raw = if payload.config.mcp_servers.is_empty() && payload.config.tools.is_empty() {
            collaborators
                .provider
                .complete(&payload.config.provider, &payload.config.model, conversation)
                .await
        } else {
            collaborators
                .tools
                .run_tool_loop(
                    &payload.config.mcp_servers,
                    &payload.config.tools,
                    conversation,
                    collaborators.provider.as_ref(),
                    &payload.config.provider,
                    &payload.config.model,
                )
                .await
        }
        .map_err(|cause| FlowError::Runtime {
            node_id: node.id.clone(),
            cause,
        })?;

        let mut shaped = Map::new();
        for field in payload.output.keys() {
            let value = raw.get(field).cloned().unwrap_or(Value::Null);
            shaped.insert(field.clone(), value);
        }
        Ok(Value::Object(shaped))
    }
}
