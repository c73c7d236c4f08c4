// src/resolver.rs
//
// =============================================================================
// FLOWRT: VARIABLE RESOLVER (C4)
// =============================================================================
//
// Turns a node's raw JSON payload into its "live" counterpart right before
// a node executor runs: every `{{head.tail...}}` token is replaced with
// whatever the registry holds for it.
//
// Two substitution modes, chosen per string leaf:
//   - Single-reference mode: the trimmed string is *exactly* one reference.
//     The resolved value's native JSON type is preserved (an object stays
//     an object, a number stays a number).
//   - Template mode: the reference is embedded in surrounding text (or
//     there's more than one). Each match is stringified and spliced in;
//     everything else in the string passes through untouched.
//
// An unresolved reference is left as its literal `{{...}}` text in both
// modes — the resolver never fails on a missing reference. The validator's
// reference-resolution pass is what guarantees nothing unresolved survives
// to reach here.

use crate::reference::{is_single_reference, parse_expr, scan_string};
use crate::registry::Registry;
use serde_json::Value;

/// Recursively resolves every reference inside a JSON value.
pub fn resolve_value(value: &Value, registry: &dyn Registry) -> Value {
    match value {
        Value::String(s) => resolve_string(s, registry),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_value(v, registry)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, registry)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn resolve_string(s: &str, registry: &dyn Registry) -> Value {
    if is_single_reference(s) {
        let trimmed = s.trim();
        let body = &trimmed[2..trimmed.len() - 2];
        if let Some((head, tail)) = parse_expr(body) {
            if let Some(resolved) = registry.resolve_expression(&head, &tail) {
                return resolved;
            }
        }
        return Value::String(s.to_string());
    }

    let refs = scan_string(s);
    if refs.is_empty() {
        return Value::String(s.to_string());
    }

    let mut out = s.to_string();
    for r in &refs {
        if let Some(resolved) = registry.resolve_expression(&r.head, &r.tail) {
            let replacement = stringify(&resolved);
            out = out.replacen(&r.full_token, &replacement, 1);
        }
    }
    Value::String(out)
}

/// Stringification for template-mode splicing: strings splice raw, every
/// other JSON type goes through its compact JSON rendering.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::InMemoryFileStore;
    use crate::registry::RootRegistry;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn registry_with(vars: Vec<(&str, Value)>) -> RootRegistry {
        let mut map = HashMap::new();
        for (k, v) in vars {
            map.insert(k.to_string(), v);
        }
        RootRegistry::new(map, HashMap::new(), Arc::new(InMemoryFileStore::new()))
    }

    #[test]
    fn single_reference_preserves_native_type() {
        let reg = registry_with(vec![("items", serde_json::json!([1, 2, 3]))]);
        let resolved = resolve_value(&Value::String("  {{items}}  ".into()), &reg);
        assert_eq!(resolved, serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn template_mode_splices_stringified_values() {
        let reg = registry_with(vec![("name", Value::String("Ada".into())), ("count", serde_json::json!(3))]);
        let resolved = resolve_value(
            &Value::String("Hello {{name}}, you have {{count}} messages".into()),
            &reg,
        );
        assert_eq!(
            resolved,
            Value::String("Hello Ada, you have 3 messages".into())
        );
    }

    #[test]
    fn unresolved_reference_is_left_literal() {
        let reg = registry_with(vec![]);
        let resolved = resolve_value(&Value::String("{{missing.thing}}".into()), &reg);
        assert_eq!(resolved, Value::String("{{missing.thing}}".into()));
    }

    #[test]
    fn recurses_through_arrays_and_objects() {
        let reg = registry_with(vec![("x", serde_json::json!(42))]);
        let input = serde_json::json!({ "a": ["{{x}}", "literal"], "b": { "c": "{{x}}" } });
        let resolved = resolve_value(&input, &reg);
        assert_eq!(resolved, serde_json::json!({ "a": [42, "literal"], "b": { "c": 42 } }));
    }
}
