// shelfbase-core/src/find_options.rs
// Find query options: projection, sort, skip, limit

use crate::error::{Result, ShelfError};
use crate::value_utils::{compare_values_with_none, get_nested_value, set_nested_value};
use serde_json::Value;

/// Options for find queries
///
/// Applied in the order sort → skip → limit → projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Projection: field → 1 (include) or 0 (exclude)
    pub projection: Option<Vec<(String, i32)>>,

    /// Sort: [(field, direction)], direction: 1 (asc) or -1 (desc)
    pub sort: Option<Vec<(String, i32)>>,

    /// Number of documents to skip (pagination offset)
    pub skip: Option<usize>,

    /// Maximum number of documents to return
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_projection(mut self, projection: Vec<(String, i32)>) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Include only `fields`, dropping `_id`
    pub fn with_fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut projection: Vec<(String, i32)> =
            fields.into_iter().map(|f| (f.into(), 1)).collect();
        projection.push(("_id".to_string(), 0));
        self.with_projection(projection)
    }

    pub fn with_sort(mut self, sort: Vec<(String, i32)>) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(sort) = &self.sort {
            if let Some((field, dir)) = sort.iter().find(|(_, d)| *d != 1 && *d != -1) {
                return Err(ShelfError::InvalidQuery(format!(
                    "Sort direction for '{}' must be 1 or -1, got {}",
                    field, dir
                )));
            }
        }
        if let Some(projection) = &self.projection {
            if let Some((field, action)) = projection.iter().find(|(_, a)| *a != 0 && *a != 1) {
                return Err(ShelfError::InvalidQuery(format!(
                    "Projection for '{}' must be 0 or 1, got {}",
                    field, action
                )));
            }
            let has_inclusions = projection.iter().any(|(_, a)| *a == 1);
            let has_non_id_exclusions = projection.iter().any(|(f, a)| *a == 0 && f != "_id");
            if has_inclusions && has_non_id_exclusions {
                return Err(ShelfError::InvalidQuery(
                    "Projection cannot mix inclusion and exclusion".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Run sort, skip, limit and projection over already-filtered documents
    pub fn apply(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if let Some(sort) = &self.sort {
            apply_sort(&mut docs, sort);
        }

        let skip = self.skip.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        let page = docs.into_iter().skip(skip).take(limit);

        match &self.projection {
            Some(projection) => page.map(|doc| apply_projection(&doc, projection)).collect(),
            None => page.collect(),
        }
    }
}

/// Apply projection to a document
///
/// Include mode keeps only the named fields (plus `_id` unless it is
/// excluded); exclude mode copies everything but the named top-level fields.
pub fn apply_projection(doc: &Value, projection: &[(String, i32)]) -> Value {
    if projection.is_empty() {
        return doc.clone();
    }

    let include_mode = projection.iter().any(|(_, a)| *a == 1);
    let exclude_id = projection.iter().any(|(f, a)| f == "_id" && *a == 0);

    let Value::Object(obj) = doc else {
        return doc.clone();
    };

    if include_mode {
        let mut result = Value::Object(serde_json::Map::new());
        if !exclude_id {
            if let Some(id) = obj.get("_id") {
                set_nested_value(&mut result, "_id", id.clone());
            }
        }
        for (field, _) in projection.iter().filter(|(_, a)| *a == 1) {
            if let Some(value) = get_nested_value(doc, field) {
                set_nested_value(&mut result, field, value.clone());
            }
        }
        result
    } else {
        let excluded = |key: &String| projection.iter().any(|(f, a)| f == key && *a == 0);
        Value::Object(
            obj.iter()
                .filter(|(k, _)| !excluded(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

/// Stable multi-key sort; ties keep their input order
pub fn apply_sort(docs: &mut [Value], sort: &[(String, i32)]) {
    if sort.is_empty() {
        return;
    }

    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let cmp = compare_values_with_none(get_nested_value(a, field), get_nested_value(b, field));
            if cmp != std::cmp::Ordering::Equal {
                return if *direction == 1 { cmp } else { cmp.reverse() };
            }
        }
        std::cmp::Ordering::Equal
    });
}
