use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use tracing::warn;

use super::structure::{Shape, StructureMap, PATH_SEPARATOR, STRUCTURE_COLUMN};
use crate::db::ID_COLUMN;

/// Row columns that never belong to the document.
pub const RESERVED_KEYS: [&str; 2] = [ID_COLUMN, STRUCTURE_COLUMN];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Rebuild a document from flattened values and the structure recorded
/// when they were flattened.
///
/// Only paths named in `structure` take part, so columns belonging to
/// other documents in the same table are ignored. A container path with no
/// leaves below it comes back as an empty object or array.
pub fn rebuild(values: &BTreeMap<String, Option<String>>, structure: &StructureMap) -> Value {
    let mut root = Value::Object(Map::new());

    for (path, shape) in structure {
        if is_reserved(path) {
            continue;
        }
        let Some(slot) = locate(&mut root, path, structure) else {
            warn!(path = %path, "path does not fit the recorded structure; skipped");
            continue;
        };
        if shape.is_container() {
            if !shape.holds(slot) {
                *slot = shape.empty();
            }
        } else {
            let raw = values.get(path).and_then(|v| v.as_deref());
            *slot = coerce(raw, *shape);
        }
    }

    root
}

/// Walk `path` from the root, descending into every prefix the structure
/// records as a container, and return the slot for the remaining key.
fn locate<'a>(root: &'a mut Value, path: &str, structure: &StructureMap) -> Option<&'a mut Value> {
    let mut cursor = root;
    let mut start = 0;

    for (pos, _) in path.match_indices(PATH_SEPARATOR) {
        if pos <= start {
            continue;
        }
        let Some(shape) = structure.get(&path[..pos]).filter(|s| s.is_container()) else {
            continue;
        };
        let node = slot(cursor, &path[start..pos])?;
        if !shape.holds(node) {
            *node = shape.empty();
        }
        cursor = node;
        start = pos + 1;
    }

    slot(cursor, &path[start..])
}

fn slot<'a>(container: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    match container {
        Value::Object(map) => Some(map.entry(key.to_string()).or_insert(Value::Null)),
        Value::Array(items) => {
            let index: usize = key.parse().ok()?;
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            items.get_mut(index)
        }
        _ => None,
    }
}

/// Turn stored text back into a JSON value of `shape`.
///
/// Text that looks like a JSON object or array is parsed as such unless
/// the shape says it was a string. Text that does not parse as the
/// recorded type is kept as a string.
pub fn coerce(raw: Option<&str>, shape: Shape) -> Value {
    let Some(text) = raw else {
        return match shape {
            Shape::String => Value::String(String::new()),
            other => other.empty(),
        };
    };

    if shape != Shape::String && looks_like_json_container(text) {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            return parsed;
        }
    }

    let fallback = || Value::String(text.to_string());
    match shape {
        Shape::String => fallback(),
        Shape::Null => Value::Null,
        Shape::Integer => parse_integer(text).unwrap_or_else(fallback),
        Shape::Float => text
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(fallback),
        Shape::Boolean => parse_bool(text).map(Value::Bool).unwrap_or_else(fallback),
        Shape::Object | Shape::Array => fallback(),
    }
}

fn looks_like_json_container(text: &str) -> bool {
    let t = text.trim();
    (t.starts_with('{') && t.ends_with('}')) || (t.starts_with('[') && t.ends_with(']'))
}

fn parse_integer(text: &str) -> Option<Value> {
    let t = text.trim();
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::from(i));
    }
    t.parse::<u64>().ok().map(Value::from)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json::flatten::flatten;
    use serde_json::json;

    fn round_trip(doc: Value) -> Value {
        let flat = flatten(doc.as_object().unwrap());
        rebuild(&flat.value_map(), &flat.structure)
    }

    #[test]
    fn test_rebuild_nested_example() {
        let doc = json!({"user": {"name": "Bob", "tags": ["x", "y"]}});
        assert_eq!(round_trip(doc.clone()), doc);
    }

    #[test]
    fn test_round_trip_scalars_and_nesting() {
        let doc = json!({
            "first_name": "Ann",
            "age": 41,
            "score": 9.5,
            "ratio": 1.0,
            "active": false,
            "nickname": null,
            "address": {"street_line": "Main St 1", "geo": {"lat": 52.1, "lng": -0.5}},
            "matrix": [[1, 2], [3]],
            "events": [{"kind": "login", "ok": true}, {"kind": "logout", "ok": false}],
            "empty_obj": {},
            "empty_list": []
        });
        assert_eq!(round_trip(doc.clone()), doc);
    }

    #[test]
    fn test_array_with_more_than_ten_elements() {
        let items: Vec<i64> = (0..12).collect();
        let doc = json!({ "n": items });
        assert_eq!(round_trip(doc.clone()), doc);
    }

    #[test]
    fn test_reserved_and_unknown_columns_are_ignored() {
        let flat = flatten(json!({"a": "x"}).as_object().unwrap());
        let mut values = flat.value_map();
        values.insert("id".into(), Some("5".into()));
        values.insert("_json_structure".into(), Some("{}".into()));
        values.insert("other_doc_field".into(), Some("zzz".into()));
        assert_eq!(rebuild(&values, &flat.structure), json!({"a": "x"}));
    }

    #[test]
    fn test_coerce_typed_values() {
        assert_eq!(coerce(Some("12"), Shape::Integer), json!(12));
        assert_eq!(coerce(Some("2.5"), Shape::Float), json!(2.5));
        assert_eq!(coerce(Some("1"), Shape::Boolean), json!(true));
        assert_eq!(coerce(Some("false"), Shape::Boolean), json!(false));
        assert_eq!(coerce(Some("None"), Shape::Null), Value::Null);
        assert_eq!(coerce(Some("abc"), Shape::Integer), json!("abc"));
        assert_eq!(coerce(None, Shape::Integer), Value::Null);
        assert_eq!(coerce(None, Shape::String), json!(""));
    }

    #[test]
    fn test_coerce_parses_embedded_json_unless_string() {
        assert_eq!(coerce(Some("[1, 2]"), Shape::Integer), json!([1, 2]));
        assert_eq!(coerce(Some(r#"{"k": "v"}"#), Shape::Null), json!({"k": "v"}));
        assert_eq!(coerce(Some("[1, 2]"), Shape::String), json!("[1, 2]"));
        assert_eq!(coerce(Some("[oops"), Shape::Integer), json!("[oops"));
    }

    #[test]
    fn test_missing_leaf_values() {
        let mut structure = StructureMap::new();
        structure.insert("gone".into(), Shape::Integer);
        structure.insert("blank".into(), Shape::String);
        assert_eq!(rebuild(&BTreeMap::new(), &structure), json!({"gone": null, "blank": ""}));
    }

    #[test]
    fn test_non_numeric_array_key_is_skipped() {
        let mut structure = StructureMap::new();
        structure.insert("list".into(), Shape::Array);
        structure.insert("list_x".into(), Shape::String);
        let mut values = BTreeMap::new();
        values.insert("list_x".to_string(), Some("v".to_string()));
        assert_eq!(rebuild(&values, &structure), json!({"list": []}));
    }
}
