// src/collaborators.rs
//
// =============================================================================
// FLOWRT: EXTERNAL COLLABORATOR CONTRACTS (C5 dependencies, §6)
// =============================================================================
//
// Everything in this module is a port, not an implementation: concrete model
// providers, vector stores, PDF rasterization, and MCP tool-calling are all
// explicitly out of scope for the core (§1). The engine dispatches through a
// small trait object per collaborator kind and never knows which concrete
// backend answered.
//
// The `Noop*` implementations let the executor and CLI run end-to-end against
// a flow with no real providers configured — useful for tests and for the
// `validate`/`inputs` CLI subcommands, which never need a live provider.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

// ============================================================================
// 1. PROVIDER CLIENT (LLM / embeddings / vector)
// ============================================================================

/// A single provider call: config + typed input in, typed output or error
/// out. Idempotence is not assumed — the core never retries internally
/// (§5, Backpressure).
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn complete(&self, provider: &str, model: &str, request: Value) -> Result<Value>;
    async fn embed(&self, provider: &str, model: &str, request: Value) -> Result<Value>;
    async fn vector_call(
        &self,
        provider: &str,
        operation: VectorOperation,
        request: Value,
    ) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorOperation {
    Insert,
    Search,
    Update,
    Delete,
}

/// A provider client with no network access, used by tests and the
/// `validate`/`inputs` CLI paths. Returns deterministic placeholder data
/// shaped like what a real provider would send back, so downstream nodes
/// (e.g. Update-Variable consuming `{{llmNode.output}}`) have something to
/// operate on in dry runs.
pub struct NoopProviderClient;

#[async_trait]
impl ProviderClient for NoopProviderClient {
    async fn complete(&self, _provider: &str, _model: &str, _request: Value) -> Result<Value> {
        Ok(serde_json::json!({}))
    }

    async fn embed(&self, _provider: &str, _model: &str, _request: Value) -> Result<Value> {
        Ok(serde_json::json!({ "embeddings": [] }))
    }

    async fn vector_call(
        &self,
        _provider: &str,
        _operation: VectorOperation,
        _request: Value,
    ) -> Result<Value> {
        Ok(serde_json::json!({ "matches": [] }))
    }
}

// ============================================================================
// 2. FILE STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileHandle {
    pub id: String,
    pub temp_path: String,
    pub mime_type: String,
    pub size: u64,
}

/// A process-wide singleton keyed by opaque ids (§5, Resource ownership).
/// Implementations register filesystem paths as declared `file`-typed
/// variable inputs are written (§4.3).
pub trait FileStore: Send + Sync {
    fn register_file(&self, path: &str) -> Result<FileHandle>;
    fn has_file(&self, id: &str) -> bool;
    fn get_file(&self, id: &str) -> Option<FileHandle>;
    fn get_file_data_url(&self, id: &str) -> Option<String>;
    fn is_image(&self, id: &str) -> bool;
}

/// In-memory file store: registers any path as a handle without touching
/// the filesystem. Good enough for tests and for hosts that hand the
/// engine pre-resolved handle ids instead of raw paths.
#[derive(Default)]
pub struct InMemoryFileStore {
    files: Mutex<HashMap<String, FileHandle>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileStore for InMemoryFileStore {
    fn register_file(&self, path: &str) -> Result<FileHandle> {
        let id = format!("file_{}", uuid::Uuid::new_v4());
        let handle = FileHandle {
            id: id.clone(),
            temp_path: path.to_string(),
            mime_type: guess_mime(path),
            size: 0,
        };
        self.files.lock().unwrap().insert(id, handle.clone());
        Ok(handle)
    }

    fn has_file(&self, id: &str) -> bool {
        self.files.lock().unwrap().contains_key(id)
    }

    fn get_file(&self, id: &str) -> Option<FileHandle> {
        self.files.lock().unwrap().get(id).cloned()
    }

    fn get_file_data_url(&self, id: &str) -> Option<String> {
        let handle = self.get_file(id)?;
        Some(format!("data:{};base64,", handle.mime_type))
    }

    fn is_image(&self, id: &str) -> bool {
        self.get_file(id)
            .map(|h| h.mime_type.starts_with("image/"))
            .unwrap_or(false)
    }
}

fn guess_mime(path: &str) -> String {
    match path.rsplit('.').next().unwrap_or("").to_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
    .to_string()
}

// ============================================================================
// 3. PDF RASTERIZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct RasterPage {
    pub image_path: String,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait PdfRasterizer: Send + Sync {
    async fn rasterize(
        &self,
        path: &str,
        dpi: u32,
        format: &str,
        quality: &str,
    ) -> Result<Vec<RasterPage>>;
}

pub struct NoopPdfRasterizer;

#[async_trait]
impl PdfRasterizer for NoopPdfRasterizer {
    async fn rasterize(
        &self,
        _path: &str,
        _dpi: u32,
        _format: &str,
        _quality: &str,
    ) -> Result<Vec<RasterPage>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// 4. TOOL-CALLING FACADE (MCP) — out of scope, contract only
// ============================================================================

#[async_trait]
pub trait ToolFacade: Send + Sync {
    /// Iteratively interleaves tool calls with the provider client up to a
    /// bounded iteration count, returning the final assistant message.
    async fn run_tool_loop(
        &self,
        servers: &[Value],
        tools: &[Value],
        conversation: Value,
        provider: &dyn ProviderClient,
        provider_name: &str,
        model: &str,
    ) -> Result<Value>;
}

pub struct NoopToolFacade;

#[async_trait]
impl ToolFacade for NoopToolFacade {
    async fn run_tool_loop(
        &self,
        _servers: &[Value],
        _tools: &[Value],
        conversation: Value,
        provider: &dyn ProviderClient,
        provider_name: &str,
        model: &str,
    ) -> Result<Value> {
        provider.complete(provider_name, model, conversation).await
    }
}

// ============================================================================
// 5. COLLABORATOR BUNDLE
// ============================================================================

/// The full set of external collaborators a `FlowExecutor` hands to node
/// executors, bundled into one context object passed to each handler
/// alongside the registry, flow id, and logger.
pub struct Collaborators {
    pub provider: std::sync::Arc<dyn ProviderClient>,
    pub files: std::sync::Arc<dyn FileStore>,
    pub rasterizer: std::sync::Arc<dyn PdfRasterizer>,
    pub tools: std::sync::Arc<dyn ToolFacade>,
}

impl Collaborators {
    pub fn noop() -> Self {
        Self {
            provider: std::sync::Arc::new(NoopProviderClient),
            files: std::sync::Arc::new(InMemoryFileStore::new()),
            rasterizer: std::sync::Arc::new(NoopPdfRasterizer),
            tools: std::sync::Arc::new(NoopToolFacade),
        }
    }
}
