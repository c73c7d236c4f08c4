// src/error.rs
//
// =============================================================================
// FLOWRT: ERROR TAXONOMY (v 0.1)
// =============================================================================
//
// A closed, typed error surface at the crate boundary. Internal call sites
// that fan out across several fallible steps (provider dispatch, collaborator
// calls) use `anyhow::Result` with `.context(...)` and convert to a
// `FlowError::Runtime` at the node-executor boundary, which is the only shape
// the flow executor's `onError` hook ever sees.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes surfaced in validation reports (see `ValidationError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidFormat,
    InvalidType,
    MissingRequiredField,
    InvalidNodeType,
    DuplicateNodeId,
    DuplicateVariableId,
    InvalidVariableReference,
    CircularDependency,
    MissingDependency,
    MissingProviderConfig,
    InvalidValue,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidFormat => "invalid-format",
            ErrorCode::InvalidType => "invalid-type",
            ErrorCode::MissingRequiredField => "missing-required-field",
            ErrorCode::InvalidNodeType => "invalid-node-type",
            ErrorCode::DuplicateNodeId => "duplicate-node-id",
            ErrorCode::DuplicateVariableId => "duplicate-variable-id",
            ErrorCode::InvalidVariableReference => "invalid-variable-reference",
            ErrorCode::CircularDependency => "circular-dependency",
            ErrorCode::MissingDependency => "missing-dependency",
            ErrorCode::MissingProviderConfig => "missing-provider-config",
            ErrorCode::InvalidValue => "invalid-value",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One finding from the validator: a path, a human message, and a stable code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
    /// One of the stable codes in `ErrorCode::as_str`, kept as a plain
    /// string on the wire so the JSON report doesn't need a custom
    /// (de)serializer for `ErrorCode` itself.
    pub code: String,
}

impl ValidationError {
    pub fn new(code: ErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            code: code.as_str().to_string(),
        }
    }
}

/// The crate-boundary error type. One family per taxonomy bucket in the
/// error-handling design: Shape, Uniqueness, Reference, Graph, Provider,
/// Type, Runtime.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("validation failed ({count} finding(s)), first: {first}", count = errors.len())]
    Validation {
        errors: Vec<ValidationError>,
        first: String,
    },

    #[error("node '{node_id}': type error on variable '{variable_id}': expected {expected}, got {found}")]
    Type {
        node_id: String,
        variable_id: String,
        expected: String,
        found: String,
    },

    #[error("node '{node_id}': unknown operator '{operator}'")]
    UnknownOperator { node_id: String, operator: String },

    #[error("node '{node_id}': provider '{provider}' not configured")]
    MissingProvider { node_id: String, provider: String },

    #[error("node '{node_id}' failed: {cause}")]
    Runtime {
        node_id: String,
        #[source]
        cause: anyhow::Error,
    },
}

impl FlowError {
    /// The single readable message the caller sees — always identifies the
    /// offending node and includes the underlying cause.
    pub fn user_message(&self) -> String {
        match self {
            FlowError::Validation { errors, .. } => {
                let first = errors
                    .first()
                    .map(|e| format!("{} ({}): {}", e.path, e.code, e.message))
                    .unwrap_or_else(|| "unknown validation error".to_string());
                format!("validation failed: {first}")
            }
            FlowError::Type {
                node_id,
                variable_id,
                expected,
                found,
            } => format!(
                "node '{node_id}': variable '{variable_id}' expected type {expected}, got {found}"
            ),
            FlowError::UnknownOperator { node_id, operator } => {
                format!("node '{node_id}': unknown operator '{operator}'")
            }
            FlowError::MissingProvider { node_id, provider } => {
                format!("node '{node_id}': provider '{provider}' is not configured")
            }
            FlowError::Runtime { node_id, cause } => format!("node '{node_id}' failed: {cause}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
