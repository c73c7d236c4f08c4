// src/nodes/document_splitter.rs
//
// =============================================================================
// FLOWRT: DOCUMENT_SPLITTER NODE EXECUTOR
// =============================================================================
//
// Rasterizes a source document (a file-store handle id, or a bare path) into
// one image per page through the `PdfRasterizer` collaborator.

use super::NodeExecutor;
use crate::collaborators::Collaborators;
use crate::error::FlowError;
use crate::flow::{DocumentSplitterPayload, Node};
use crate::registry::Registry;
use async_trait::async_trait;
use serde_json::Value;

pub struct DocumentSplitterExecutor;

#[async_trait]
impl NodeExecutor for DocumentSplitterExecutor {
    async fn execute(
        &self,
        node: &Node,
        _registry: &dyn Registry,
        collaborators: &Collaborators,
        flow_id: &str,
    ) -> Result<Value, FlowError> {
        let payload: DocumentSplitterPayload =
            serde_json::from_value(node.payload.clone()).map_err(|e| FlowError::Runtime {
                node_id: node.id.clone(),
                cause: anyhow::anyhow!("invalid DOCUMENT_SPLITTER payload: {e}"),
            })?;

        log::debug!("flow '{flow_id}': node '{}' splitting document", node.id);

        let path = payload
            .document
            .as_str()
            .ok_or_else(|| FlowError::Type {
                node_id: node.id.clone(),
                variable_id: "document".to_string(),
                expected: "string (file handle or path)".to_string(),
                found: "non-string".to_string(),
            })?
            .to_string();

        let source = collaborators
            .files
            .get_file(&path)
            .map(|h| h.temp_path)
            .unwrap_or(path);

        let format = match payload.config.image_format {
            crate::flow::ImageFormat::Png => "png",
            crate::flow::ImageFormat::Jpg => "jpg",
            crate::flow::ImageFormat::Webp => "webp",
        };
        let quality = match payload.config.image_quality {
            crate::flow::ImageQuality::Low => "low",
            crate::flow::ImageQuality::Medium => "medium",
            crate::flow::ImageQuality::High => "high",
        };

        let pages = collaborators
            .rasterizer
            .rasterize(&source, payload.config.dpi, format, quality)
            .await
            .map_err(|cause| FlowError::Runtime {
                node_id: node.id.clone(),
                cause,
            })?;

        let rendered: Vec<Value> = pages
            .into_iter()
            .map(|p| {
                serde_json::json!({
                    "image_path": p.image_path,
                    "width": p.width,
                    "height": p.height,
                })
            })
            .collect();

        let page_count = rendered.len();
        Ok(serde_json::json!({ "pages": rendered, "page_count": page_count }))
    }
}
