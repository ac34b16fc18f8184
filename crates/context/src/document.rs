//! Schemaless key-value documents and the pure transformations applied to them
//! before they become part of a snapshot.

use serde_json::{Map, Value};

/// A schemaless record: field name → JSON value, in source field order.
pub type Document = Map<String, Value>;

const ELLIPSIS: &str = "...";

/// Recursively drop null values, blank strings, and arrays/objects that end up
/// empty. Strings that survive are trimmed.
///
/// Returns `None` when the value itself is empty after pruning.
pub fn prune_empty(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else if trimmed.len() == s.len() {
                Some(Value::String(s))
            } else {
                Some(Value::String(trimmed.to_string()))
            }
        },
        Value::Array(items) => {
            let kept: Vec<Value> = items.into_iter().filter_map(prune_empty).collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        },
        Value::Object(map) => {
            let kept = prune_document(map);
            (!kept.is_empty()).then_some(Value::Object(kept))
        },
        scalar => Some(scalar),
    }
}

/// [`prune_empty`] for a document; the document itself may end up empty.
pub fn prune_document(doc: Document) -> Document {
    doc.into_iter()
        .filter_map(|(k, v)| prune_empty(v).map(|v| (k, v)))
        .collect()
}

/// Drop the named top-level fields (exclusion projection).
pub fn without_fields(mut doc: Document, excluded: &[String]) -> Document {
    for field in excluded {
        doc.remove(field);
    }
    doc
}

/// Cap `text` at `max_chars` characters, replacing the tail with an ellipsis
/// when it is cut. The result never exceeds `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(ELLIPSIS.len());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Render a field value as plain text for chunking.
///
/// Strings are used verbatim, arrays of scalars are comma-joined, nested
/// objects fall back to compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => items
            .iter()
            .map(render_value)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
