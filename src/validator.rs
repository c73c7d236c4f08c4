// src/validator.rs
//
// =============================================================================
// FLOWRT: VALIDATOR (C2)
// =============================================================================
//
// Five passes over a parsed `Flow`, each appending findings to one report
// instead of bailing on the first problem — a flow author fixing validation
// errors one at a time would otherwise spend one round-trip per mistake.
//
//   1. Structural:    required fields, id/variable uniqueness, shape per kind
//   2. Reference:     every `{{...}}` resolves to a declared variable or a
//                      node id visible at that point in the document
//   3. Graph:         dependency graph over top-level nodes, cycle detection,
//                      topological sort -> execution order
//   4. Provider:      (optional) declared providers are in the caller's
//                      available-provider set
//   5. Semantic:      advisory warnings that don't fail validation
//
// Collect-everything rather than fail-fast, with the dependency graph and
// topological sort built on `petgraph`'s `DiGraph` + `toposort`.

use crate::error::{ErrorCode, ValidationError};
use crate::flow::{
    ConditionPayload, DocumentSplitterPayload, FilterCondition, Flow, ForEachPayload, LlmPayload,
    Node, NodeKind, TextEmbeddingPayload, UpdateOp, UpdateVariablePayload, VectorPayload,
};
use crate::reference::{is_identifier, scan_value, Reference, ScanScope};
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationError>,
    /// Topologically sorted top-level node ids; empty when structural
    /// errors made graph construction meaningless.
    pub execution_order: Vec<String>,
}

/// One flattened node plus the id of the top-level node that owns its
/// execution (itself, for top-level nodes; the enclosing CONDITION/FOR_EACH
/// for nested ones). Holds an owned clone rather than a borrow: nested
/// bodies are only reachable by re-deserializing a node's payload, which
/// produces values with no lifetime tying them back to the original `Flow`.
struct Flattened {
    node: Node,
    path: String,
    owner: String,
}

fn flatten(nodes: &[Node], owner: Option<&str>, path: &str, out: &mut Vec<Flattened>) {
    for (i, node) in nodes.iter().enumerate() {
        let this_owner = owner.unwrap_or(&node.id).to_string();
        let node_path = format!("{path}[{i}]");
        out.push(Flattened {
            node: node.clone(),
            path: node_path.clone(),
            owner: this_owner.clone(),
        });

        match node.kind {
            NodeKind::Condition => {
                if let Ok(payload) = serde_json::from_value::<ConditionPayload>(node.payload.clone()) {
                    for (bname, branch) in &payload.branches {
                        flatten(
                            &branch.nodes,
                            Some(&this_owner),
                            &format!("{node_path}.branches.{bname}"),
                            out,
                        );
                    }
                }
            }
            NodeKind::ForEach => {
                if let Ok(payload) = serde_json::from_value::<ForEachPayload>(node.payload.clone()) {
                    flatten(
                        &payload.each_nodes,
                        Some(&this_owner),
                        &format!("{node_path}.each_nodes"),
                        out,
                    );
                }
            }
            _ => {}
        }
    }
}

pub fn validate(flow: &Flow, available_providers: Option<&HashSet<String>>) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut flat = Vec::new();
    flatten(&flow.nodes, None, "$.nodes", &mut flat);

    // ------------------------------------------------------------------
    // Pass 1: structural
    // ------------------------------------------------------------------
    if flow.name.trim().is_empty() {
        errors.push(ValidationError::new(
            ErrorCode::MissingRequiredField,
            "$.name",
            "flow name must not be empty",
        ));
    }
    if flow.parsed_version().is_err() {
        errors.push(ValidationError::new(
            ErrorCode::InvalidFormat,
            "$.version",
            format!("'{}' is not a valid semver version", flow.version),
        ));
    }
    if flow.nodes.is_empty() {
        errors.push(ValidationError::new(
            ErrorCode::MissingRequiredField,
            "$.nodes",
            "flow must declare at least one node",
        ));
    }

    let mut variable_ids: HashSet<String> = HashSet::new();
    for (i, var) in flow.variables.iter().enumerate() {
        if var.id.trim().is_empty() {
            errors.push(ValidationError::new(
                ErrorCode::MissingRequiredField,
                format!("$.variables[{i}].id"),
                "variable id must not be empty",
            ));
            continue;
        }
        if !variable_ids.insert(var.id.clone()) {
            errors.push(ValidationError::new(
                ErrorCode::DuplicateVariableId,
                format!("$.variables[{i}].id"),
                format!("duplicate variable id '{}'", var.id),
            ));
        }
    }

    let mut all_node_ids: HashSet<String> = HashSet::new();
    let mut id_owner: HashMap<String, String> = HashMap::new();
    for f in &flat {
        if f.node.id.trim().is_empty() {
            errors.push(ValidationError::new(
                ErrorCode::MissingRequiredField,
                format!("{}.id", f.path),
                "node id must not be empty",
            ));
            continue;
        }
        if !all_node_ids.insert(f.node.id.clone()) {
            errors.push(ValidationError::new(
                ErrorCode::DuplicateNodeId,
                format!("{}.id", f.path),
                format!("duplicate node id '{}'", f.node.id),
            ));
        }
        id_owner.insert(f.node.id.clone(), f.owner.clone());
    }

    for f in &flat {
        errors.extend(check_node_shape(&f.node, &f.path, &variable_ids));
    }

    for (i, id) in flow.input.iter().enumerate() {
        if !variable_ids.contains(id) {
            errors.push(ValidationError::new(
                ErrorCode::InvalidVariableReference,
                format!("$.input[{i}]"),
                format!("declared input '{id}' is not among the flow's declared variables"),
            ));
        }
    }
    for (i, id) in flow.output.iter().enumerate() {
        if !variable_ids.contains(id) {
            errors.push(ValidationError::new(
                ErrorCode::InvalidVariableReference,
                format!("$.output[{i}]"),
                format!("declared output '{id}' is not among the flow's declared variables"),
            ));
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: reference resolution
    // ------------------------------------------------------------------
    let top_level_ids: HashSet<String> = flow.nodes.iter().map(|n| n.id.clone()).collect();
    validate_references(
        &flow.nodes,
        &ScanScope::default(),
        &variable_ids,
        &all_node_ids,
        "$.nodes",
        &mut errors,
    );

    // ------------------------------------------------------------------
    // Pass 3: dependency graph + topological sort (top-level nodes only)
    // ------------------------------------------------------------------
    let mut execution_order = Vec::new();
    if errors.is_empty() {
        let mut graph = DiGraph::<String, ()>::new();
        let mut indices = HashMap::new();
        // Add nodes in `flow.nodes` declaration order, not `top_level_ids`'s
        // `HashSet` iteration order — `toposort` breaks ties between
        // independent nodes by `NodeIndex` (insertion order), and that order
        // must be stable across repeated validations and match declaration
        // order per §5's "ties broken by declaration order".
        for node in &flow.nodes {
            indices.insert(node.id.clone(), graph.add_node(node.id.clone()));
        }

        for f in &flat {
            if !top_level_ids.contains(&f.owner) {
                continue;
            }
            for r in scan_value(&f.node.payload) {
                if !r.is_output_reference() {
                    continue;
                }
                let Some(target_owner) = id_owner.get(&r.head) else {
                    continue;
                };
                if target_owner == &f.owner {
                    continue;
                }
                if let (Some(&from), Some(&to)) =
                    (indices.get(target_owner), indices.get(&f.owner))
                {
                    graph.update_edge(from, to, ());
                }
            }
        }

        match petgraph::algo::toposort(&graph, None) {
            Ok(order) => {
                execution_order = order.into_iter().map(|idx| graph[idx].clone()).collect();
            }
            Err(cycle) => {
                let node_id = graph[cycle.node_id()].clone();
                errors.push(ValidationError::new(
                    ErrorCode::CircularDependency,
                    "$.nodes",
                    format!(
                        "circular dependency detected involving node '{node_id}'"
                    ),
                ));
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 4: provider availability (optional)
    // ------------------------------------------------------------------
    if let Some(available) = available_providers {
        for f in &flat {
            if let Some(provider) = extract_provider(&f.node) {
                if !available.contains(&provider) {
                    warnings.push(ValidationError::new(
                        ErrorCode::MissingProviderConfig,
                        format!("{}.config.provider", f.path),
                        format!("provider '{provider}' is not among the configured providers"),
                    ));
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 5: semantic / advisory
    // ------------------------------------------------------------------
    for f in &flat {
        if f.node.kind == NodeKind::Condition {
            if let Ok(payload) = serde_json::from_value::<ConditionPayload>(f.node.payload.clone()) {
                if !payload.branches.contains_key(crate::flow::DEFAULT_BRANCH) {
                    warnings.push(ValidationError::new(
                        ErrorCode::InvalidValue,
                        format!("{}.branches", f.path),
                        "condition node has no 'default' branch; unmatched values will produce no output",
                    ));
                }
                for (bname, branch) in &payload.branches {
                    if branch.nodes.is_empty() {
                        warnings.push(advisory(
                            "empty-body",
                            format!("{}.branches.{bname}", f.path),
                            format!("branch '{bname}' has an empty node list and will have no effect"),
                        ));
                    }
                }
            }
        }
    }

    warnings.push(advisory(
        "advisory-complexity",
        "$.nodes",
        format!(
            "flow has {} node(s) total ({} top-level): complexity bucket '{}'",
            flat.len(),
            flow.nodes.len(),
            complexity_bucket(flat.len())
        ),
    ));

    for w in &warnings {
        log::warn!("flow '{}': {} ({}): {}", flow.name, w.path, w.code, w.message);
    }

    let ok = errors.is_empty();
    ValidationReport {
        ok,
        errors,
        warnings,
        execution_order,
    }
}

/// Advisory findings (empty-body, complexity bucketing) aren't fatal and
/// don't belong to the closed error-code set in `ErrorCode` — they're
/// still reported through `ValidationError` so the CLI's JSON report has
/// one shape for both errors and warnings, just with an informational code.
fn advisory(code: &str, path: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError {
        path: path.into(),
        message: message.into(),
        code: code.to_string(),
    }
}

/// Low/medium/high bucketing on total (flattened) node count, per §4.2 pass 5.
fn complexity_bucket(node_count: usize) -> &'static str {
    match node_count {
        0..=9 => "low",
        10..=29 => "medium",
        _ => "high",
    }
}

fn extract_provider(node: &Node) -> Option<String> {
    node.payload
        .get("config")
        .and_then(|c| c.get("provider"))
        .and_then(|p| p.as_str())
        .map(|s| s.to_string())
}

/// Recursively validates that every reference in this node list resolves,
/// threading the `ScanScope` through ForEach/Condition boundaries per the
/// scope-enrichment rule (`{{each_key}}` and body node ids are only visible
/// inside their own loop/branch subtree).
fn validate_references(
    nodes: &[Node],
    scope: &ScanScope,
    variable_ids: &HashSet<String>,
    all_node_ids: &HashSet<String>,
    path: &str,
    errors: &mut Vec<ValidationError>,
) {
    for (i, node) in nodes.iter().enumerate() {
        let node_path = format!("{path}[{i}]");
        for r in scan_value(&node.payload) {
            if !reference_resolves(&r, scope, variable_ids, all_node_ids) {
                errors.push(ValidationError::new(
                    ErrorCode::InvalidVariableReference,
                    node_path.clone(),
                    format!(
                        "reference '{{{{{}}}}}' in node '{}' does not resolve to any declared variable or visible node output",
                        r.expr(),
                        node.id
                    ),
                ));
            }
        }

        match node.kind {
            NodeKind::ForEach => {
                if let Ok(payload) = serde_json::from_value::<ForEachPayload>(node.payload.clone()) {
                    let body_ids: HashSet<String> =
                        payload.each_nodes.iter().map(|n| n.id.clone()).collect();
                    let child_scope = scope.child_with_loop(&payload.config.each_key, &body_ids);
                    validate_references(
                        &payload.each_nodes,
                        &child_scope,
                        variable_ids,
                        all_node_ids,
                        &format!("{node_path}.each_nodes"),
                        errors,
                    );
                }
            }
            NodeKind::Condition => {
                if let Ok(payload) = serde_json::from_value::<ConditionPayload>(node.payload.clone()) {
                    for (bname, branch) in &payload.branches {
                        validate_references(
                            &branch.nodes,
                            scope,
                            variable_ids,
                            all_node_ids,
                            &format!("{node_path}.branches.{bname}"),
                            errors,
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

fn reference_resolves(
    r: &Reference,
    scope: &ScanScope,
    variable_ids: &HashSet<String>,
    all_node_ids: &HashSet<String>,
) -> bool {
    if scope.scope_keys.contains(&r.head) {
        return true;
    }
    if all_node_ids.contains(&r.head) {
        return true;
    }
    variable_ids.contains(&r.head)
}

/// Checks the kind-specific required fields on one node's payload by
/// attempting to deserialize it into its typed shape; a `serde_json` error
/// becomes a `MissingRequiredField`/`InvalidFormat` finding.
fn check_node_shape(node: &Node, path: &str, variable_ids: &HashSet<String>) -> Vec<ValidationError> {
    let mut out = Vec::new();
    macro_rules! shape_check {
        ($ty:ty) => {
            if let Err(e) = serde_json::from_value::<$ty>(node.payload.clone()) {
                out.push(ValidationError::new(
                    ErrorCode::MissingRequiredField,
                    path,
                    format!("node '{}' ({:?}): {}", node.id, node.kind, e),
                ));
            }
        };
    }

    match node.kind {
        NodeKind::Llm => {
            shape_check!(LlmPayload);
        }
        NodeKind::DocumentSplitter => {
            shape_check!(DocumentSplitterPayload);
        }
        NodeKind::TextEmbedding => {
            shape_check!(TextEmbeddingPayload);
        }
        NodeKind::VectorInsert
        | NodeKind::VectorSearch
        | NodeKind::VectorUpdate
        | NodeKind::VectorDelete => {
            shape_check!(VectorPayload);
        }
        NodeKind::UpdateVariable => match serde_json::from_value::<UpdateVariablePayload>(node.payload.clone()) {
            Ok(payload) => {
                if !variable_ids.contains(&payload.config.variable_id) {
                    out.push(ValidationError::new(
                        ErrorCode::InvalidVariableReference,
                        format!("{path}.config.variable_id"),
                        format!(
                            "node '{}' targets undeclared variable '{}'",
                            node.id, payload.config.variable_id
                        ),
                    ));
                }
                out.extend(check_update_op_fields(node, path, &payload));
            }
            Err(e) => out.push(ValidationError::new(
                ErrorCode::MissingRequiredField,
                path,
                format!("node '{}' (UPDATE_VARIABLE): {}", node.id, e),
            )),
        },
        NodeKind::Condition => {
            shape_check!(ConditionPayload);
        }
        NodeKind::ForEach => match serde_json::from_value::<ForEachPayload>(node.payload.clone()) {
            Ok(payload) => {
                if !is_identifier(&payload.config.each_key) {
                    out.push(ValidationError::new(
                        ErrorCode::InvalidValue,
                        format!("{path}.config.each_key"),
                        format!(
                            "node '{}': each_key '{}' is not a valid identifier",
                            node.id, payload.config.each_key
                        ),
                    ));
                }
                if payload.each_nodes.is_empty() {
                    out.push(ValidationError::new(
                        ErrorCode::MissingRequiredField,
                        format!("{path}.each_nodes"),
                        format!("node '{}': for-each body must contain at least one node", node.id),
                    ));
                }
            }
            Err(e) => out.push(ValidationError::new(
                ErrorCode::MissingRequiredField,
                path,
                format!("node '{}' (FOR_EACH): {}", node.id, e),
            )),
        },
    }
    out
}

fn check_update_op_fields(
    node: &Node,
    path: &str,
    payload: &UpdateVariablePayload,
) -> Vec<ValidationError> {
    let mut out = Vec::new();
    let cfg = &payload.config;
    match cfg.op {
        UpdateOp::Join | UpdateOp::Append => {
            if cfg.join_str.is_none() && cfg.op == UpdateOp::Join {
                out.push(ValidationError::new(
                    ErrorCode::MissingRequiredField,
                    format!("{path}.config.join_str"),
                    format!("node '{}': 'join' operation requires join_str", node.id),
                ));
            }
        }
        UpdateOp::Pick | UpdateOp::Omit => {
            if cfg.fields.is_none() {
                out.push(ValidationError::new(
                    ErrorCode::MissingRequiredField,
                    format!("{path}.config.fields"),
                    format!("node '{}': '{:?}' operation requires fields", node.id, cfg.op),
                ));
            }
        }
        UpdateOp::Extract => {
            if cfg.field_path.is_none() {
                out.push(ValidationError::new(
                    ErrorCode::MissingRequiredField,
                    format!("{path}.config.field_path"),
                    format!("node '{}': 'extract' operation requires field_path", node.id),
                ));
            }
        }
        UpdateOp::Filter => {
            if let Some(FilterCondition { operator, .. }) = &cfg.condition {
                if !matches!(
                    operator.as_str(),
                    "equals" | "not_equals" | "greater_than" | "less_than" | "contains"
                ) {
                    out.push(ValidationError::new(
                        ErrorCode::InvalidValue,
                        format!("{path}.config.condition.operator"),
                        format!("node '{}': unknown filter operator '{}'", node.id, operator),
                    ));
                }
            } else {
                out.push(ValidationError::new(
                    ErrorCode::MissingRequiredField,
                    format!("{path}.config.condition"),
                    format!("node '{}': 'filter' operation requires a condition", node.id),
                ));
            }
        }
        UpdateOp::Slice => {
            if cfg.slice_start.is_none() && cfg.slice_end.is_none() {
                out.push(ValidationError::new(
                    ErrorCode::MissingRequiredField,
                    format!("{path}.config.slice_start"),
                    format!("node '{}': 'slice' operation requires slice_start and/or slice_end", node.id),
                ));
            }
        }
        UpdateOp::Map => {
            if cfg.mapping.is_none() {
                out.push(ValidationError::new(
                    ErrorCode::MissingRequiredField,
                    format!("{path}.config.mapping"),
                    format!("node '{}': 'map' operation requires mapping", node.id),
                ));
            }
        }
        UpdateOp::Update | UpdateOp::Flatten | UpdateOp::Concat => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flow_from(value: serde_json::Value) -> Flow {
        Flow::from_json(&value).expect("flow should parse")
    }

    #[test]
    fn detects_duplicate_node_ids() {
        let flow = flow_from(json!({
            "name": "f", "version": "1.0.0", "description": "",
            "variables": [],
            "nodes": [
                {"id": "n1", "type": "UPDATE_VARIABLE", "config": {"variable_id": "x", "type": "update"}, "value": 1},
                {"id": "n1", "type": "UPDATE_VARIABLE", "config": {"variable_id": "x", "type": "update"}, "value": 2}
            ]
        }));
        let mut flow = flow;
        flow.variables.push(crate::flow::VariableDeclaration {
            id: "x".to_string(),
            var_type: None,
            default: None,
        });
        let report = validate(&flow, None);
        assert!(!report.ok);
        assert!(report
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::DuplicateNodeId.as_str()));
    }

    #[test]
    fn detects_circular_dependency() {
        let mut flow = flow_from(json!({
            "name": "f", "version": "1.0.0", "description": "",
            "variables": [{"id": "x", "type": "number"}],
            "nodes": [
                {"id": "a", "type": "UPDATE_VARIABLE", "config": {"variable_id": "x", "type": "update"}, "value": "{{b.output}}"},
                {"id": "b", "type": "UPDATE_VARIABLE", "config": {"variable_id": "x", "type": "update"}, "value": "{{a.output}}"}
            ]
        }));
        flow.variables[0].var_type = Some(crate::flow::VariableType::Number);
        let report = validate(&flow, None);
        assert!(!report.ok);
        assert!(report
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::CircularDependency.as_str()));
    }

    #[test]
    fn forward_reference_is_fine_after_sort() {
        let mut flow = flow_from(json!({
            "name": "f", "version": "1.0.0", "description": "",
            "variables": [{"id": "x", "type": "number"}],
            "nodes": [
                {"id": "a", "type": "UPDATE_VARIABLE", "config": {"variable_id": "x", "type": "update"}, "value": "{{b.output}}"},
                {"id": "b", "type": "UPDATE_VARIABLE", "config": {"variable_id": "x", "type": "update"}, "value": 1}
            ]
        }));
        flow.variables[0].var_type = Some(crate::flow::VariableType::Number);
        let report = validate(&flow, None);
        assert!(report.ok, "{:?}", report.errors);
        assert_eq!(report.execution_order, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn missing_variable_reference_is_an_error() {
        let flow = flow_from(json!({
            "name": "f", "version": "1.0.0", "description": "",
            "variables": [],
            "nodes": [
                {"id": "a", "type": "UPDATE_VARIABLE", "config": {"variable_id": "missing", "type": "update"}, "value": "{{ghost}}"}
            ]
        }));
        let report = validate(&flow, None);
        assert!(!report.ok);
        assert!(report
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::InvalidVariableReference.as_str()));
    }
}
