use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::db::{StoreError, StoreResult};

/// Column holding a row's serialized [`StructureMap`].
pub const STRUCTURE_COLUMN: &str = "_json_structure";

/// Joins parent and child keys in a flattened path.
pub const PATH_SEPARATOR: char = '_';

/// Shape of one node in a flattened document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[serde(alias = "dict")]
    Object,
    #[serde(alias = "list")]
    Array,
    #[serde(alias = "str")]
    String,
    #[serde(alias = "int")]
    Integer,
    Float,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "NoneType")]
    Null,
}

impl Shape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => Shape::Object,
            Value::Array(_) => Shape::Array,
            Value::String(_) => Shape::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => Shape::Integer,
            Value::Number(_) => Shape::Float,
            Value::Bool(_) => Shape::Boolean,
            Value::Null => Shape::Null,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Shape::Object | Shape::Array)
    }

    /// Whether `value` is a container of this shape.
    pub fn holds(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Shape::Object, Value::Object(_)) | (Shape::Array, Value::Array(_))
        )
    }

    /// An empty node of this shape; `null` for scalar shapes.
    pub fn empty(&self) -> Value {
        match self {
            Shape::Object => Value::Object(serde_json::Map::new()),
            Shape::Array => Value::Array(Vec::new()),
            _ => Value::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Shape::Object => "object",
            Shape::Array => "array",
            Shape::String => "string",
            Shape::Integer => "integer",
            Shape::Float => "float",
            Shape::Boolean => "boolean",
            Shape::Null => "null",
        }
    }
}

/// Flattened path to the shape recorded for it.
pub type StructureMap = BTreeMap<String, Shape>;

pub fn encode_structure(structure: &StructureMap) -> StoreResult<String> {
    serde_json::to_string(structure).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn decode_structure(text: &str) -> StoreResult<StructureMap> {
    if text.trim().is_empty() {
        return Err(StoreError::JsonStructure("structure column is empty".to_string()));
    }
    serde_json::from_str(text).map_err(|e| StoreError::JsonStructure(e.to_string()))
}
