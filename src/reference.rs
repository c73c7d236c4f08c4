// src/reference.rs
//
// =============================================================================
// FLOWRT: REFERENCE SCANNER (C1)
// =============================================================================
//
// Extracts `{{...}}` tokens from any JSON value. Doesn't know about the
// registry or execution order — just grammar and scope bookkeeping. The
// validator and variable resolver both build on top of this.

use serde_json::Value;
use std::collections::HashSet;

/// A single `{{head.tail...}}` occurrence found inside a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The full original token, including braces — what template mode
    /// substitutes back in when unresolved.
    pub full_token: String,
    pub head: String,
    /// Dotted path after the head, empty when the reference is bare (`{{x}}`).
    pub tail: Vec<String>,
}

impl Reference {
    pub fn expr(&self) -> String {
        if self.tail.is_empty() {
            self.head.clone()
        } else {
            format!("{}.{}", self.head, self.tail.join("."))
        }
    }

    /// True when the tail starts with `output` — the mark of a dependency
    /// edge (node-output reference) rather than a plain variable read.
    pub fn is_output_reference(&self) -> bool {
        self.tail.first().map(|s| s == "output").unwrap_or(false)
    }
}

/// Parses one `{{...}}` body (without braces) into head + dotted tail.
/// Returns `None` if the body isn't a valid `identifier(.identifier)*`.
pub fn parse_expr(raw: &str) -> Option<(String, Vec<String>)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parts = trimmed.split('.');
    let head = parts.next()?;
    if !is_identifier(head) {
        return None;
    }
    let mut tail = Vec::new();
    for part in parts {
        if !is_identifier(part) {
            return None;
        }
        tail.push(part.to_string());
    }
    Some((head.to_string(), tail))
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Scans a single string for `{{...}}` occurrences, left to right.
pub fn scan_string(s: &str) -> Vec<Reference> {
    let mut out = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            if let Some(end) = find_close(s, i + 2) {
                let body = &s[i + 2..end];
                let full_token = s[i..end + 2].to_string();
                if let Some((head, tail)) = parse_expr(body) {
                    out.push(Reference {
                        full_token,
                        head,
                        tail,
                    });
                }
                i = end + 2;
                continue;
            }
        }
        i += 1;
    }
    out
}

fn find_close(s: &str, from: usize) -> Option<usize> {
    s[from..].find("}}").map(|p| from + p)
}

/// Returns true when the *entire* trimmed string is exactly one reference —
/// the single-reference-mode test from the variable resolver design notes.
pub fn is_single_reference(s: &str) -> bool {
    let trimmed = s.trim();
    trimmed.starts_with("{{")
        && trimmed.ends_with("}}")
        && find_close(trimmed, 2) == Some(trimmed.len() - 2)
}

/// Recursively walks a JSON value collecting every reference found in any
/// string leaf. Arrays and objects are walked in their natural order.
pub fn scan_value(value: &Value) -> Vec<Reference> {
    let mut out = Vec::new();
    walk_value(value, &mut out);
    out
}

fn walk_value(value: &Value, out: &mut Vec<Reference>) {
    match value {
        Value::String(s) => out.extend(scan_string(s)),
        Value::Array(items) => items.iter().for_each(|v| walk_value(v, out)),
        Value::Object(map) => map.values().for_each(|v| walk_value(v, out)),
        _ => {}
    }
}

/// The set of identifiers active at a reference site: scope keys (the
/// loop's `each_key` and `<each_key>_index`), body-scope node ids (ids of
/// nodes nested inside an enclosing For-Each body, including transitively
/// nested loops), and global node ids.
#[derive(Debug, Clone, Default)]
pub struct ScanScope {
    pub scope_keys: HashSet<String>,
    pub body_node_ids: HashSet<String>,
}

impl ScanScope {
    pub fn child_with_loop(&self, each_key: &str, body_ids: &HashSet<String>) -> ScanScope {
        let mut scope_keys = self.scope_keys.clone();
        scope_keys.insert(each_key.to_string());
        scope_keys.insert(format!("{each_key}_index"));

        let mut body_node_ids = self.body_node_ids.clone();
        body_node_ids.extend(body_ids.iter().cloned());

        ScanScope {
            scope_keys,
            body_node_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_dotted_expr() {
        assert_eq!(parse_expr("foo"), Some(("foo".into(), vec![])));
        assert_eq!(
            parse_expr("foo.bar.baz"),
            Some(("foo".into(), vec!["bar".into(), "baz".into()]))
        );
        assert_eq!(parse_expr(""), None);
        assert_eq!(parse_expr("1bad"), None);
    }

    #[test]
    fn scans_multiple_occurrences_in_order() {
        let refs = scan_string("Hello {{user.name}}, you scored {{score}}!");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].head, "user");
        assert_eq!(refs[0].tail, vec!["name".to_string()]);
        assert_eq!(refs[1].head, "score");
        assert!(refs[1].tail.is_empty());
    }

    #[test]
    fn single_reference_mode_detection() {
        assert!(is_single_reference("{{node.output.records}}"));
        assert!(is_single_reference("  {{node.output}}  "));
        assert!(!is_single_reference("prefix {{node.output}}"));
        assert!(!is_single_reference("{{a}} and {{b}}"));
    }

    #[test]
    fn is_output_reference_detects_output_tail() {
        let (head, tail) = parse_expr("nodeA.output.text").unwrap();
        let r = Reference {
            full_token: "{{nodeA.output.text}}".into(),
            head,
            tail,
        };
        assert!(r.is_output_reference());
    }

    #[test]
    fn scan_value_walks_nested_structures() {
        let v = serde_json::json!({
            "a": "{{x}}",
            "b": ["{{y.z}}", 1, true],
        });
        let refs = scan_value(&v);
        assert_eq!(refs.len(), 2);
    }
}
