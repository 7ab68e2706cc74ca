use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::structure::{Shape, StructureMap, PATH_SEPARATOR};

/// A document reduced to scalar columns plus the shapes needed to undo it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flattened {
    /// Leaf values in document order. JSON null is `None`.
    pub values: Vec<(String, Option<String>)>,
    pub structure: StructureMap,
}

impl Flattened {
    pub fn value_map(&self) -> BTreeMap<String, Option<String>> {
        self.values.iter().cloned().collect()
    }
}

/// Flatten an object into underscore-joined leaf paths.
///
/// Every nested object and array records its shape at its own path; the
/// root does not. Array elements use their index as the path segment.
pub fn flatten(document: &Map<String, Value>) -> Flattened {
    let mut out = Flattened::default();
    for (key, value) in document {
        walk(key.clone(), value, &mut out);
    }
    out
}

fn walk(path: String, value: &Value, out: &mut Flattened) {
    out.structure.insert(path.clone(), Shape::of(value));
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                walk(join(&path, key), child, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(join(&path, &i.to_string()), child, out);
            }
        }
        scalar => out.values.push((path, scalar_text(scalar))),
    }
}

fn join(parent: &str, key: &str) -> String {
    let mut path = String::with_capacity(parent.len() + key.len() + 1);
    path.push_str(parent);
    path.push(PATH_SEPARATOR);
    path.push_str(key);
    path
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Containers never reach here.
        other => Some(other.to_string()),
    }
}
