// shelfbase-core/src/index.rs
//! Secondary indexes
//!
//! An index keeps entries ordered by the composite key built from the indexed
//! fields. Array values are multikey: one entry per element, so a document
//! can appear under several keys. Lookups only use the leading field: an
//! equality, `$in` or range condition on it turns into one or more ordered
//! range scans.
//!
//! Entries are always stored in ascending key order. [`IndexDirection`] is
//! part of the index identity (and name) but scans treat every field as
//! ascending.

use crate::document::DocumentId;
use crate::error::{Result, ShelfError};
use crate::value_utils::get_nested_value;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::ops::Bound;

/// Per-field direction in an index specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexDirection {
    Ascending,
    Descending,
}

impl IndexDirection {
    pub fn as_i32(self) -> i32 {
        match self {
            IndexDirection::Ascending => 1,
            IndexDirection::Descending => -1,
        }
    }
}

/// Ordered list of `(field, direction)` pairs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexSpec {
    pub fields: Vec<(String, IndexDirection)>,
}

impl IndexSpec {
    pub fn new(fields: Vec<(String, IndexDirection)>) -> Result<Self> {
        if fields.is_empty() {
            return Err(ShelfError::IndexError(
                "Index needs at least one field".to_string(),
            ));
        }
        for (i, (field, _)) in fields.iter().enumerate() {
            if field.is_empty() || field.starts_with('$') {
                return Err(ShelfError::IndexError(format!("Invalid index field '{}'", field)));
            }
            if fields[..i].iter().any(|(f, _)| f == field) {
                return Err(ShelfError::IndexError(format!(
                    "Field '{}' appears twice in index",
                    field
                )));
            }
        }
        Ok(IndexSpec { fields })
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        IndexSpec {
            fields: vec![(field.into(), IndexDirection::Ascending)],
        }
    }

    /// Conventional name, e.g. `genre_1_price_-1`
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|(field, dir)| format!("{}_{}", field, dir.as_i32()))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn leading_field(&self) -> &str {
        &self.fields[0].0
    }
}

/// Index key - one component per indexed field
///
/// All numbers share one variant so that `12` and `12.99` order correctly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexKey {
    Null,
    Number(OrderedFloat),
    String(String),
    Bool(bool),
}

/// f64 wrapper with a total order (NaN sorts last)
#[derive(Debug, Clone, Copy)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.is_nan(), other.0.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal),
        }
    }
}

impl From<&Value> for IndexKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => n
                .as_f64()
                .map(|f| IndexKey::Number(OrderedFloat(f)))
                .unwrap_or(IndexKey::Null),
            Value::String(s) => IndexKey::String(s.clone()),
            // Objects, and arrays reaching here as a whole, are not indexed by value
            _ => IndexKey::Null,
        }
    }
}

impl IndexKey {
    /// Bounds covering every key of the same type, so that an open range
    /// never crosses into other types
    fn type_bracket(&self) -> (Bound<IndexKey>, Bound<IndexKey>) {
        match self {
            IndexKey::Null => (Bound::Included(IndexKey::Null), Bound::Included(IndexKey::Null)),
            IndexKey::Number(_) => (
                Bound::Excluded(IndexKey::Null),
                Bound::Excluded(IndexKey::String(String::new())),
            ),
            IndexKey::String(_) => (
                Bound::Included(IndexKey::String(String::new())),
                Bound::Excluded(IndexKey::Bool(false)),
            ),
            IndexKey::Bool(_) => (Bound::Included(IndexKey::Bool(false)), Bound::Unbounded),
        }
    }
}

type KeyRange = (Bound<IndexKey>, Bound<IndexKey>);

/// Ranges over the leading index field derived from one filter condition
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBounds {
    ranges: Vec<KeyRange>,
}

impl ScanBounds {
    /// Translate a field condition into scan ranges
    ///
    /// Returns `None` when the condition cannot be answered from the index
    /// (`$ne`, `$nin`, `$exists`, ...).
    pub fn from_condition(condition: &Value) -> Option<Self> {
        let ops = match condition {
            Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => ops,
            Value::Array(_) | Value::Object(_) => return None,
            literal => return Some(Self::point(IndexKey::from(literal))),
        };

        let mut lower: Option<Bound<IndexKey>> = None;
        let mut upper: Option<Bound<IndexKey>> = None;
        for (op, value) in ops {
            let key = IndexKey::from(value);
            match op.as_str() {
                "$eq" => return Some(Self::point(key)),
                "$in" => {
                    let points = value.as_array()?;
                    return Some(ScanBounds {
                        ranges: points
                            .iter()
                            .map(|v| {
                                let k = IndexKey::from(v);
                                (Bound::Included(k.clone()), Bound::Included(k))
                            })
                            .collect(),
                    });
                }
                "$gt" => lower = Some(Bound::Excluded(key)),
                "$gte" => lower = Some(Bound::Included(key)),
                "$lt" => upper = Some(Bound::Excluded(key)),
                "$lte" => upper = Some(Bound::Included(key)),
                _ => return None,
            }
        }

        let reference = match (&lower, &upper) {
            (Some(Bound::Included(k) | Bound::Excluded(k)), _) => k.clone(),
            (_, Some(Bound::Included(k) | Bound::Excluded(k))) => k.clone(),
            _ => return None,
        };
        let (type_lower, type_upper) = reference.type_bracket();
        Some(ScanBounds {
            ranges: vec![(lower.unwrap_or(type_lower), upper.unwrap_or(type_upper))],
        })
    }

    fn point(key: IndexKey) -> Self {
        ScanBounds {
            ranges: vec![(Bound::Included(key.clone()), Bound::Included(key))],
        }
    }
}

fn above_lower(key: &IndexKey, lower: &Bound<IndexKey>) -> bool {
    match lower {
        Bound::Included(b) => key >= b,
        Bound::Excluded(b) => key > b,
        Bound::Unbounded => true,
    }
}

fn below_upper(key: &IndexKey, upper: &Bound<IndexKey>) -> bool {
    match upper {
        Bound::Included(b) => key <= b,
        Bound::Excluded(b) => key < b,
        Bound::Unbounded => true,
    }
}

/// Result of walking an index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexScan {
    pub keys_examined: u64,
    pub ids: Vec<DocumentId>,
}

/// Keys one field value contributes; never empty so the document is
/// always reachable through the index
fn field_keys(value: Option<&Value>) -> Vec<IndexKey> {
    match value {
        Some(Value::Array(items)) if !items.is_empty() => {
            let mut keys: Vec<IndexKey> = items.iter().map(IndexKey::from).collect();
            keys.sort();
            keys.dedup();
            keys
        }
        Some(value) => vec![IndexKey::from(value)],
        None => vec![IndexKey::Null],
    }
}

/// Ordered index over one collection
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    spec: IndexSpec,
    entries: BTreeSet<(Vec<IndexKey>, DocumentId)>,
}

impl SecondaryIndex {
    pub fn new(spec: IndexSpec) -> Self {
        SecondaryIndex {
            spec,
            entries: BTreeSet::new(),
        }
    }

    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    pub fn name(&self) -> String {
        self.spec.name()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every composite key of `doc`: the cartesian product of each field's
    /// keys, where an array contributes one key per element
    fn keys_for(&self, doc: &Value) -> Vec<Vec<IndexKey>> {
        let mut keys: Vec<Vec<IndexKey>> = vec![Vec::new()];
        for (field, _) in &self.spec.fields {
            let components = field_keys(get_nested_value(doc, field));
            keys = keys
                .into_iter()
                .flat_map(|prefix| {
                    components.iter().map(move |component| {
                        let mut key = prefix.clone();
                        key.push(component.clone());
                        key
                    })
                })
                .collect();
        }
        keys
    }

    pub fn insert(&mut self, id: &DocumentId, doc: &Value) {
        for key in self.keys_for(doc) {
            self.entries.insert((key, id.clone()));
        }
    }

    pub fn remove(&mut self, id: &DocumentId, doc: &Value) {
        for key in self.keys_for(doc) {
            self.entries.remove(&(key, id.clone()));
        }
    }

    /// Walk every range on the leading field, in key order
    pub fn scan(&self, bounds: &ScanBounds) -> IndexScan {
        let mut scan = IndexScan::default();
        let mut seen = HashSet::new();

        for (lower, upper) in &bounds.ranges {
            let start = match lower {
                Bound::Included(k) | Bound::Excluded(k) => {
                    Bound::Included((vec![k.clone()], DocumentId::Int(i64::MIN)))
                }
                Bound::Unbounded => Bound::Unbounded,
            };

            let hits = self
                .entries
                .range((start, Bound::Unbounded))
                .skip_while(|(key, _)| !above_lower(&key[0], lower))
                .take_while(|(key, _)| below_upper(&key[0], upper));

            for (_, id) in hits {
                scan.keys_examined += 1;
                if seen.insert(id) {
                    scan.ids.push(id.clone());
                }
            }
        }

        scan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn price_index() -> SecondaryIndex {
        let mut index = SecondaryIndex::new(IndexSpec::ascending("price"));
        for (i, price) in [12.99, 9.99, 10.5, 15.99, 10.5].iter().enumerate() {
            index.insert(&DocumentId::Int(i as i64 + 1), &json!({"price": price}));
        }
        index.insert(&DocumentId::Int(6), &json!({"price": "n/a"}));
        index.insert(&DocumentId::Int(7), &json!({"title": "no price"}));
        index
    }

    fn scan(index: &SecondaryIndex, condition: Value) -> Vec<i64> {
        let bounds = ScanBounds::from_condition(&condition).unwrap();
        index
            .scan(&bounds)
            .ids
            .into_iter()
            .map(|id| match id {
                DocumentId::Int(i) => i,
                DocumentId::String(_) => -1,
            })
            .collect()
    }

    #[test]
    fn test_index_name() {
        let spec = IndexSpec::new(vec![
            ("genre".to_string(), IndexDirection::Ascending),
            ("price".to_string(), IndexDirection::Descending),
        ])
        .unwrap();
        assert_eq!(spec.name(), "genre_1_price_-1");
        assert_eq!(spec.leading_field(), "genre");
    }

    #[test]
    fn test_spec_validation() {
        assert!(IndexSpec::new(vec![]).is_err());
        assert!(IndexSpec::new(vec![
            ("title".to_string(), IndexDirection::Ascending),
            ("title".to_string(), IndexDirection::Descending),
        ])
        .is_err());
    }

    #[test]
    fn test_equality_scan() {
        let index = price_index();
        assert_eq!(scan(&index, json!(10.5)), vec![3, 5]);
        assert_eq!(scan(&index, json!({"$eq": 9.99})), vec![2]);
        assert_eq!(scan(&index, json!(null)), vec![7]);
    }

    #[test]
    fn test_range_scan_stays_within_type() {
        let index = price_index();
        assert_eq!(scan(&index, json!({"$gt": 10.5})), vec![1, 4]);
        assert_eq!(scan(&index, json!({"$gte": 10.5, "$lt": 13})), vec![3, 5, 1]);
        assert_eq!(scan(&index, json!({"$lt": 10})), vec![2]);
    }

    #[test]
    fn test_in_scan() {
        let index = price_index();
        assert_eq!(scan(&index, json!({"$in": [15.99, 9.99]})), vec![4, 2]);
    }

    #[test]
    fn test_unindexable_conditions() {
        assert!(ScanBounds::from_condition(&json!({"$ne": 3})).is_none());
        assert!(ScanBounds::from_condition(&json!({"$exists": true})).is_none());
        assert!(ScanBounds::from_condition(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_remove_entry() {
        let mut index = price_index();
        index.remove(&DocumentId::Int(3), &json!({"price": 10.5}));
        assert_eq!(scan(&index, json!(10.5)), vec![5]);
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn test_compound_index_leading_scan() {
        let spec = IndexSpec::new(vec![
            ("genre".to_string(), IndexDirection::Ascending),
            ("published_year".to_string(), IndexDirection::Ascending),
        ])
        .unwrap();
        let mut index = SecondaryIndex::new(spec);
        index.insert(&DocumentId::Int(1), &json!({"genre": "Fiction", "published_year": 1960}));
        index.insert(&DocumentId::Int(2), &json!({"genre": "Fantasy", "published_year": 1937}));
        index.insert(&DocumentId::Int(3), &json!({"genre": "Fiction", "published_year": 1925}));

        assert_eq!(scan(&index, json!("Fiction")), vec![3, 1]);
        assert_eq!(scan(&index, json!({"$gt": "Fantasy"})), vec![3, 1]);
    }

    #[test]
    fn test_array_values_are_multikey() {
        let mut index = SecondaryIndex::new(IndexSpec::ascending("tags"));
        index.insert(&DocumentId::Int(1), &json!({"tags": ["scifi", "classic", "scifi"]}));
        index.insert(&DocumentId::Int(2), &json!({"tags": "classic"}));
        index.insert(&DocumentId::Int(3), &json!({"tags": []}));
        assert_eq!(index.len(), 4);

        assert_eq!(scan(&index, json!("scifi")), vec![1]);
        assert_eq!(scan(&index, json!("classic")), vec![1, 2]);
        assert_eq!(scan(&index, json!({"$in": ["scifi", "classic"]})), vec![1, 2]);
        assert_eq!(scan(&index, json!(null)), vec![3]);

        index.remove(&DocumentId::Int(1), &json!({"tags": ["scifi", "classic", "scifi"]}));
        assert_eq!(index.len(), 2);
        assert!(scan(&index, json!("scifi")).is_empty());
    }

    #[test]
    fn test_descending_spec_scans_in_key_order() {
        let spec = IndexSpec::new(vec![("price".to_string(), IndexDirection::Descending)]).unwrap();
        let mut index = SecondaryIndex::new(spec);
        for (i, price) in [12.99, 9.99, 15.99].iter().enumerate() {
            index.insert(&DocumentId::Int(i as i64 + 1), &json!({"price": price}));
        }
        assert_eq!(index.name(), "price_-1");
        assert_eq!(scan(&index, json!({"$gt": 0})), vec![2, 1, 3]);
    }
}
