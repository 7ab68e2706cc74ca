use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use super::flatten::flatten;
use super::rebuild::{is_reserved, rebuild};
use super::structure::{decode_structure, encode_structure, STRUCTURE_COLUMN};
use crate::db::{StoreError, StoreResult};

/// Flattened columns of a document, `_json_structure` last.
pub fn document_columns(document: &Value) -> StoreResult<Vec<(String, Option<String>)>> {
    let Value::Object(map) = document else {
        return Err(StoreError::JsonStructure(format!(
            "document root must be an object, got {}",
            type_name(document)
        )));
    };
    if let Some(key) = map.keys().find(|k| is_reserved(k)) {
        return Err(StoreError::JsonStructure(format!(
            "document uses reserved top-level key {:?}",
            key
        )));
    }

    let flat = flatten(map);
    let structure = encode_structure(&flat.structure)?;
    let mut columns = flat.values;
    columns.push((STRUCTURE_COLUMN.to_string(), Some(structure)));
    Ok(columns)
}

/// Rebuild a document from a row's columns.
///
/// Fails with [`StoreError::JsonStructure`] when the structure column is
/// missing, null or unparsable.
pub fn try_document_from_row(row: &BTreeMap<String, Option<String>>) -> StoreResult<Value> {
    let raw = row
        .get(STRUCTURE_COLUMN)
        .ok_or_else(|| StoreError::JsonStructure(format!("row has no {} column", STRUCTURE_COLUMN)))?
        .as_deref()
        .ok_or_else(|| StoreError::JsonStructure(format!("{} is null", STRUCTURE_COLUMN)))?;
    let structure = decode_structure(raw)?;
    Ok(rebuild(row, &structure))
}

/// Like [`try_document_from_row`], but a bad structure yields `{}`.
pub fn document_from_row(row: &BTreeMap<String, Option<String>>) -> Value {
    match try_document_from_row(row) {
        Ok(doc) => doc,
        Err(err) => {
            warn!(error = %err, "cannot rebuild document; returning empty");
            empty_document()
        }
    }
}

pub fn empty_document() -> Value {
    Value::Object(Map::new())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
