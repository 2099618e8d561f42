// shelfbase-core/src/query/operators.rs
//! Query operators
//!
//! Each operator is a separate type implementing [`OperatorMatcher`] and is
//! looked up by name in a static registry.
//!
//! ```text
//! OperatorMatcher
//!   ├── comparison: $eq $ne $gt $gte $lt $lte $in $nin
//!   ├── element:    $exists
//!   └── logical:    $and $or $nor
//! ```

use crate::error::{Result, ShelfError};
use crate::value_utils::{compare_values, get_nested_value};
use lazy_static::lazy_static;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Trait for all query operators
pub trait OperatorMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// `doc_value` is the field value (`None` when the field is missing);
    /// logical operators ignore it and recurse into `document`.
    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool>;
}

// ============================================================================
// COMPARISON OPERATORS
// ============================================================================

/// $eq, also used for implicit `{field: value}` equality
pub struct EqOperator;

impl OperatorMatcher for EqOperator {
    fn name(&self) -> &'static str {
        "$eq"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Value>,
    ) -> Result<bool> {
        Ok(match doc_value {
            // {field: null} matches missing fields
            None => filter_value.is_null(),
            Some(v) => values_equal(v, filter_value) || array_contains(v, filter_value),
        })
    }
}

pub struct NeOperator;

impl OperatorMatcher for NeOperator {
    fn name(&self) -> &'static str {
        "$ne"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        Ok(!EqOperator.matches(doc_value, filter_value, document)?)
    }
}

macro_rules! ordering_operator {
    ($ty:ident, $name:literal, $pred:expr) => {
        pub struct $ty;

        impl OperatorMatcher for $ty {
            fn name(&self) -> &'static str {
                $name
            }

            fn matches(
                &self,
                doc_value: Option<&Value>,
                filter_value: &Value,
                _document: Option<&Value>,
            ) -> Result<bool> {
                Ok(compare_with_predicate(doc_value, filter_value, $pred))
            }
        }
    };
}

ordering_operator!(GtOperator, "$gt", |o| o == Ordering::Greater);
ordering_operator!(GteOperator, "$gte", |o| o != Ordering::Less);
ordering_operator!(LtOperator, "$lt", |o| o == Ordering::Less);
ordering_operator!(LteOperator, "$lte", |o| o != Ordering::Greater);

pub struct InOperator;

impl OperatorMatcher for InOperator {
    fn name(&self) -> &'static str {
        "$in"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        let candidates = expect_array(filter_value, "$in")?;
        for candidate in candidates {
            if EqOperator.matches(doc_value, candidate, document)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub struct NinOperator;

impl OperatorMatcher for NinOperator {
    fn name(&self) -> &'static str {
        "$nin"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        Ok(!InOperator.matches(doc_value, filter_value, document)?)
    }
}

// ============================================================================
// ELEMENT OPERATORS
// ============================================================================

pub struct ExistsOperator;

impl OperatorMatcher for ExistsOperator {
    fn name(&self) -> &'static str {
        "$exists"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        _document: Option<&Value>,
    ) -> Result<bool> {
        let should_exist = filter_value
            .as_bool()
            .ok_or_else(|| ShelfError::InvalidQuery("$exists requires a boolean".to_string()))?;
        Ok(doc_value.is_some() == should_exist)
    }
}

// ============================================================================
// LOGICAL OPERATORS
// ============================================================================

pub struct AndOperator;

impl OperatorMatcher for AndOperator {
    fn name(&self) -> &'static str {
        "$and"
    }

    fn matches(
        &self,
        _doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        let document = require_document(document, "$and")?;
        for clause in expect_array(filter_value, "$and")? {
            if !matches_filter(document, clause)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

pub struct OrOperator;

impl OperatorMatcher for OrOperator {
    fn name(&self) -> &'static str {
        "$or"
    }

    fn matches(
        &self,
        _doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        let document = require_document(document, "$or")?;
        for clause in expect_array(filter_value, "$or")? {
            if matches_filter(document, clause)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

pub struct NorOperator;

impl OperatorMatcher for NorOperator {
    fn name(&self) -> &'static str {
        "$nor"
    }

    fn matches(
        &self,
        doc_value: Option<&Value>,
        filter_value: &Value,
        document: Option<&Value>,
    ) -> Result<bool> {
        Ok(!OrOperator.matches(doc_value, filter_value, document)?)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

lazy_static! {
    static ref OPERATOR_REGISTRY: HashMap<&'static str, Box<dyn OperatorMatcher>> = {
        let operators: Vec<Box<dyn OperatorMatcher>> = vec![
            Box::new(EqOperator),
            Box::new(NeOperator),
            Box::new(GtOperator),
            Box::new(GteOperator),
            Box::new(LtOperator),
            Box::new(LteOperator),
            Box::new(InOperator),
            Box::new(NinOperator),
            Box::new(ExistsOperator),
            Box::new(AndOperator),
            Box::new(OrOperator),
            Box::new(NorOperator),
        ];
        operators.into_iter().map(|op| (op.name(), op)).collect()
    };
}

const LOGICAL_OPERATORS: [&str; 3] = ["$and", "$or", "$nor"];

fn lookup(name: &str) -> Result<&'static dyn OperatorMatcher> {
    OPERATOR_REGISTRY
        .get(name)
        .map(|op| op.as_ref())
        .ok_or_else(|| ShelfError::InvalidQuery(format!("Unknown operator: {}", name)))
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

// Array fields match when any element equals the filter value
fn array_contains(doc_value: &Value, filter_value: &Value) -> bool {
    match doc_value {
        Value::Array(items) => items.iter().any(|item| values_equal(item, filter_value)),
        _ => false,
    }
}

fn compare_with_predicate<F>(doc_value: Option<&Value>, filter_value: &Value, predicate: F) -> bool
where
    F: Fn(Ordering) -> bool,
{
    match doc_value {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, filter_value).map(&predicate).unwrap_or(false)),
        Some(v) => compare_values(v, filter_value).map(&predicate).unwrap_or(false),
    }
}

fn expect_array<'a>(value: &'a Value, op: &str) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| ShelfError::InvalidQuery(format!("{} requires an array", op)))
}

fn require_document<'a>(document: Option<&'a Value>, op: &str) -> Result<&'a Value> {
    document.ok_or_else(|| ShelfError::InvalidQuery(format!("{} needs a document context", op)))
}

/// Evaluate an operator object (`{"$gt": 5, "$lt": 10}`) or a literal
/// (implicit `$eq`) against one field value
fn matches_condition(
    doc_value: Option<&Value>,
    condition: &Value,
    document: &Value,
) -> Result<bool> {
    if let Value::Object(ops) = condition {
        if ops.keys().any(|k| k.starts_with('$')) {
            for (op_name, op_value) in ops {
                if LOGICAL_OPERATORS.contains(&op_name.as_str()) {
                    return Err(ShelfError::InvalidQuery(format!(
                        "{} is only valid at the top level",
                        op_name
                    )));
                }
                if !lookup(op_name)?.matches(doc_value, op_value, Some(document))? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }
    }
    EqOperator.matches(doc_value, condition, Some(document))
}

/// Check a document against a filter
pub fn matches_filter(document: &Value, filter: &Value) -> Result<bool> {
    let filter_obj = filter
        .as_object()
        .ok_or_else(|| ShelfError::InvalidQuery("Filter must be an object".to_string()))?;

    for (key, condition) in filter_obj {
        let matched = if key.starts_with('$') {
            lookup(key)?.matches(None, condition, Some(document))?
        } else {
            matches_condition(get_nested_value(document, key), condition, document)?
        };
        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Walk a filter and reject unknown operators without needing a document
pub fn validate_filter(filter: &Value) -> Result<()> {
    let filter_obj = filter
        .as_object()
        .ok_or_else(|| ShelfError::InvalidQuery("Filter must be an object".to_string()))?;

    for (key, condition) in filter_obj {
        if key.starts_with('$') {
            if !LOGICAL_OPERATORS.contains(&key.as_str()) {
                return Err(ShelfError::InvalidQuery(format!(
                    "Unknown top-level operator: {}",
                    key
                )));
            }
            for clause in expect_array(condition, key)? {
                validate_filter(clause)?;
            }
        } else if let Value::Object(ops) = condition {
            for op_name in ops.keys().filter(|k| k.starts_with('$')) {
                lookup(op_name)?;
            }
        }
    }
    Ok(())
}
