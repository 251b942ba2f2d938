//! Applies a [`FieldTree`] to an untyped JSON document.

use crate::fields::{Field, FieldTree};
use serde_json::{Map, Value as JsonValue};

/// Returns the sub-document of `doc` selected by `tree`.
///
/// Leaves are copied verbatim. Nested trees recurse into objects and map over
/// arrays element-wise. Fields missing from `doc` are omitted; a non-object
/// `doc` projects to the empty object.
pub fn project(doc: &JsonValue, tree: &FieldTree) -> JsonValue {
    match doc {
        JsonValue::Object(map) => JsonValue::Object(project_map(map, tree)),
        _ => JsonValue::Object(Map::new()),
    }
}

pub fn project_map(map: &Map<String, JsonValue>, tree: &FieldTree) -> Map<String, JsonValue> {
    let mut out = Map::new();
    for (name, field) in tree.iter() {
        let Some(value) = map.get(name) else {
            continue;
        };
        let projected = match field {
            Field::Leaf => value.clone(),
            Field::Node(sub) => project_nested(value, sub),
        };
        out.insert(name.to_string(), projected);
    }
    out
}

fn project_nested(value: &JsonValue, tree: &FieldTree) -> JsonValue {
    match value {
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .filter(|item| !is_empty_object(item))
                .map(|item| project(item, tree))
                .collect(),
        ),
        other => project(other, tree),
    }
}

fn is_empty_object(value: &JsonValue) -> bool {
    value.as_object().is_some_and(|m| m.is_empty())
}

/// True when `tree` keeps nothing of a non-empty `doc`: the document does not
/// conform to the selection at all.
pub fn is_schema_mismatch(doc: &JsonValue, tree: &FieldTree) -> bool {
    let source_empty = match doc {
        JsonValue::Object(m) => m.is_empty(),
        JsonValue::Null => true,
        _ => false,
    };
    !source_empty && is_empty_object(&project(doc, tree))
}
