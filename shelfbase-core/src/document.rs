// shelfbase-core/src/document.rs
use crate::error::{Result, ShelfError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Document identifier stored under `_id`
///
/// Untagged so that it appears as a plain value inside documents: `{"_id": 2}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum DocumentId {
    Int(i64),
    String(String),
}

impl DocumentId {
    /// Next auto-increment ID after `last_id`
    pub fn new_auto(last_id: u64) -> Self {
        DocumentId::Int((last_id + 1) as i64)
    }

    /// Read the `_id` of a stored document
    pub fn of(doc: &Value) -> Result<Self> {
        let id = doc
            .get("_id")
            .ok_or_else(|| ShelfError::Serialization("Document has no _id".to_string()))?;
        serde_json::from_value(id.clone())
            .map_err(|e| ShelfError::Serialization(format!("Invalid _id: {}", e)))
    }

    pub fn to_value(&self) -> Value {
        match self {
            DocumentId::Int(i) => Value::from(*i),
            DocumentId::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(i) => write!(f, "{}", i),
            DocumentId::String(s) => write!(f, "{}", s),
        }
    }
}

/// Borrow a document as a JSON object, rejecting every other shape
pub fn as_object_mut(doc: &mut Value) -> Result<&mut Map<String, Value>> {
    doc.as_object_mut()
        .ok_or_else(|| ShelfError::Serialization("Document must be an object".to_string()))
}
