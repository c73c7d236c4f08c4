// src/flow.rs
//
// =============================================================================
// FLOWRT: FLOW SCHEMA AUTHORITY
// =============================================================================
//
// The "Esperanto" of the runtime: strict data contracts for the JSON documents
// callers submit. Everything downstream (validator, registry, executors) reads
// these types instead of poking at raw `serde_json::Value`.
//
// Design Principles:
// 1. Closed enums for node kinds and variable types: no stringly-typed dispatch.
// 2. Dynamic payload fields stay `serde_json::Value` — the value shapes are
//    kind-specific and the validator is the place that actually checks them.
// 3. A `Flow` is immutable after construction; nothing downstream mutates it.

use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// 1. TOP-LEVEL DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub variables: Vec<VariableDeclaration>,
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,

    pub nodes: Vec<Node>,
}

impl Flow {
    pub fn from_json(raw: &Value) -> serde_json::Result<Self> {
        serde_json::from_value(raw.clone())
    }

    /// Parses and checks that `version` is valid semver. Structural validation
    /// of everything else happens in the multi-pass validator.
    pub fn parsed_version(&self) -> Result<Version, semver::Error> {
        Version::parse(&self.version)
    }
}

// ============================================================================
// 2. VARIABLE DECLARATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    File,
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub id: String,
    #[serde(rename = "type", default)]
    pub var_type: Option<VariableType>,
    #[serde(default)]
    pub default: Option<Value>,
}

// ============================================================================
// 3. NODES
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Llm,
    DocumentSplitter,
    TextEmbedding,
    VectorInsert,
    VectorSearch,
    VectorUpdate,
    VectorDelete,
    UpdateVariable,
    Condition,
    ForEach,
}

/// A single processing step. The payload is kept as a raw JSON object and
/// re-parsed into the kind-specific shape by whichever executor owns it;
/// this mirrors how the validator needs to peek at the same fields before
/// any executor runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub name: String,

    /// Everything besides id/type/name, kept verbatim. Executors and the
    /// validator both deserialize the sub-fields they need out of this.
    #[serde(flatten)]
    pub payload: Value,
}

impl Node {
    /// Convenience accessor used by the reference scanner and validator:
    /// the payload as a JSON object, or an empty map if somehow absent.
    pub fn payload_fields(&self) -> serde_json::Map<String, Value> {
        self.payload.as_object().cloned().unwrap_or_default()
    }
}

// ============================================================================
// 4. FOR-EACH BODY
// ============================================================================

/// `each_nodes` on a FOR_EACH node's payload is itself a list of `Node`,
/// recursively — loops can nest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachConfig {
    pub each_key: String,
    #[serde(default)]
    pub delay_between: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachPayload {
    pub config: ForEachConfig,
    pub input: ForEachInput,
    pub each_nodes: Vec<Node>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForEachInput {
    pub items: Value,
}

// ============================================================================
// 5. CONDITION BRANCHES
// ============================================================================

/// `branches` is an `IndexMap`, not a `HashMap`: §4.6 requires branches to
/// be checked in declaration order, and only `preserve_order`-backed
/// `serde_json::Value` + an order-preserving map keep that order intact
/// from the original JSON object through to branch selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionPayload {
    pub input: ConditionInput,
    pub branches: IndexMap<String, Branch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionInput {
    pub switch_value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

pub const DEFAULT_BRANCH: &str = "default";

// ============================================================================
// 6. UPDATE-VARIABLE PAYLOAD
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOp {
    Update,
    Join,
    Append,
    Extract,
    Pick,
    Omit,
    Map,
    Filter,
    Slice,
    Flatten,
    Concat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVariableConfig {
    pub variable_id: String,
    #[serde(rename = "type")]
    pub op: UpdateOp,
    #[serde(default)]
    pub join_str: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub field_path: Option<String>,
    #[serde(default)]
    pub mapping: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub condition: Option<FilterCondition>,
    #[serde(default)]
    pub slice_start: Option<i64>,
    #[serde(default)]
    pub slice_end: Option<i64>,
    #[serde(default)]
    pub stringify_output: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateVariablePayload {
    pub config: UpdateVariableConfig,
    pub value: Value,
}

// ============================================================================
// 7. LLM PAYLOAD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub mcp_servers: Vec<Value>,
    #[serde(default)]
    pub tools: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: MessageRole,
    /// Either a plain string or a list of content parts (text/image); kept
    /// dynamic because the provider client, not the core, interprets parts.
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFieldSpec {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub items: Option<Box<OutputFieldSpec>>,
    #[serde(default)]
    pub structure: Option<HashMap<String, OutputFieldSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmPayload {
    pub config: LlmConfig,
    pub messages: Vec<LlmMessage>,
    pub output: HashMap<String, OutputFieldSpec>,
}

// ============================================================================
// 8. DOCUMENT SPLITTER PAYLOAD
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpg,
    Webp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSplitterConfig {
    pub image_quality: ImageQuality,
    pub dpi: u32,
    pub image_format: ImageFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSplitterPayload {
    pub config: DocumentSplitterConfig,
    pub document: Value,
}

// ============================================================================
// 9. TEXT EMBEDDING PAYLOAD
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEmbeddingConfig {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TextEmbeddingInput {
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default)]
    pub texts: Option<Value>,
    #[serde(default)]
    pub items: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextEmbeddingPayload {
    pub config: TextEmbeddingConfig,
    pub input: TextEmbeddingInput,
}

// ============================================================================
// 10. VECTOR STORE PAYLOADS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    pub provider: String,
    pub index_name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
    #[serde(default)]
    pub filter: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub config: VectorConfig,
    #[serde(default)]
    pub input: Value,
}
