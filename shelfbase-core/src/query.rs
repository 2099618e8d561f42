// shelfbase-core/src/query.rs
//! Mongo-style JSON filters
//!
//! A filter is a JSON object whose keys are either field paths (matched with
//! implicit equality or an operator object) or top-level logical operators:
//!
//! ```ignore
//! {"in_stock": true, "published_year": {"$gt": 1950}}
//! {"$or": [{"genre": "Fiction"}, {"pages": {"$lt": 200}}]}
//! ```
//!
//! Matching is delegated to the operator registry in [`operators`].

pub mod operators;

use crate::error::{Result, ShelfError};
use serde_json::Value;

pub use operators::matches_filter;

/// A validated filter
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    json: Value,
}

impl Query {
    /// Empty query, matches every document
    pub fn new() -> Self {
        Query {
            json: Value::Object(serde_json::Map::new()),
        }
    }

    /// Wrap a JSON filter, rejecting anything that is not an object or that
    /// names an unknown operator
    pub fn from_json(json: &Value) -> Result<Self> {
        if !json.is_object() {
            return Err(ShelfError::InvalidQuery(
                "Filter must be an object".to_string(),
            ));
        }
        operators::validate_filter(json)?;
        Ok(Query { json: json.clone() })
    }

    pub fn matches(&self, document: &Value) -> Result<bool> {
        operators::matches_filter(document, &self.json)
    }

    pub fn as_json(&self) -> &Value {
        &self.json
    }

    /// Condition attached to a top-level field, if the filter constrains it
    pub fn field_condition(&self, field: &str) -> Option<&Value> {
        self.json.get(field)
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_query_matches_all() {
        let query = Query::new();
        assert!(query.matches(&json!({"title": "Emma"})).unwrap());
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(Query::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_unknown_operator_rejected_up_front() {
        let err = Query::from_json(&json!({"price": {"$near": 5}})).unwrap_err();
        assert!(matches!(err, ShelfError::InvalidQuery(_)));
    }

    #[test]
    fn test_field_condition() {
        let query = Query::from_json(&json!({"genre": "Fiction", "pages": {"$gt": 100}})).unwrap();
        assert_eq!(query.field_condition("genre"), Some(&json!("Fiction")));
        assert_eq!(query.field_condition("author"), None);
    }
}
