//! JSON value helpers shared by the query engine, find options and aggregation
//!
//! Nested fields are addressed with dot notation (`"publisher.city"`).

use serde_json::Value;
use std::cmp::Ordering;

/// Get nested value from JSON with dot notation support
///
/// ```
/// use serde_json::json;
/// use shelfbase_core::value_utils::get_nested_value;
///
/// let doc = json!({"publisher": {"city": "London"}});
/// assert_eq!(get_nested_value(&doc, "publisher.city"), Some(&json!("London")));
/// ```
pub fn get_nested_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    if !path.contains('.') {
        return doc.get(path);
    }

    let mut value = doc;
    for part in path.split('.') {
        match value {
            Value::Object(map) => value = map.get(part)?,
            Value::Array(arr) => value = arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }
    Some(value)
}

/// Set a value at a nested path, creating intermediate objects
pub fn set_nested_value(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let mut parts = path.split('.').peekable();

    while let Some(part) = parts.next() {
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        current = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
}

/// Remove the value at a nested path, returning it when present
pub fn remove_nested_value(doc: &mut Value, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => doc.as_object_mut()?.remove(path),
        Some((parent, leaf)) => {
            let mut current = doc;
            for part in parent.split('.') {
                current = current.as_object_mut()?.get_mut(part)?;
            }
            current.as_object_mut()?.remove(leaf)
        }
    }
}

/// Compare two JSON values
///
/// Returns `None` for incompatible types (e.g. string vs number).
///
/// ```
/// use serde_json::json;
/// use std::cmp::Ordering;
/// use shelfbase_core::value_utils::compare_values;
///
/// assert_eq!(compare_values(&json!(12.5), &json!(3)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&json!("a"), &json!(1)), None);
/// ```
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            if let (Some(i1), Some(i2)) = (n1.as_i64(), n2.as_i64()) {
                return Some(i1.cmp(&i2));
            }
            n1.as_f64()?.partial_cmp(&n2.as_f64()?)
        }
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Compare two optional values for sorting
///
/// Missing and null values order before everything else; values of
/// different types order by type (numbers, strings, objects, arrays, booleans).
pub fn compare_values_with_none(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(av), Some(bv)) => compare_values(av, bv).unwrap_or_else(|| type_rank(av).cmp(&type_rank(bv))),
    }
}

// Cross-type order: numbers < strings < objects < arrays < booleans
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Numeric view of a value; `None` for anything that is not a number
pub fn as_number(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Build a JSON number, keeping integral results as integers
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_nested_value_paths() {
        let doc = json!({"a": {"b": [10, {"c": "x"}]}});
        assert_eq!(get_nested_value(&doc, "a.b.0"), Some(&json!(10)));
        assert_eq!(get_nested_value(&doc, "a.b.1.c"), Some(&json!("x")));
        assert_eq!(get_nested_value(&doc, "a.z"), None);
    }

    #[test]
    fn test_set_and_remove_nested() {
        let mut doc = json!({"title": "Emma"});
        set_nested_value(&mut doc, "meta.edition", json!(2));
        assert_eq!(doc["meta"]["edition"], 2);

        assert_eq!(remove_nested_value(&mut doc, "meta.edition"), Some(json!(2)));
        assert_eq!(remove_nested_value(&mut doc, "title"), Some(json!("Emma")));
        assert_eq!(remove_nested_value(&mut doc, "missing.path"), None);
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(compare_values(&json!(10), &json!(9.99)), Some(Ordering::Greater));
        assert_eq!(compare_values(&json!(1949), &json!(1949)), Some(Ordering::Equal));
    }

    #[test]
    fn test_none_orders_first() {
        assert_eq!(compare_values_with_none(None, Some(&json!(1))), Ordering::Less);
        assert_eq!(
            compare_values_with_none(Some(&json!(null)), Some(&json!("a"))),
            Ordering::Less
        );
        assert_eq!(
            compare_values_with_none(Some(&json!(5)), Some(&json!("a"))),
            Ordering::Less
        );
    }

    #[test]
    fn test_number_value_keeps_integers() {
        assert_eq!(number_value(1950.0), json!(1950));
        assert_eq!(number_value(11.16), json!(11.16));
    }

    #[test]
    fn test_cross_type_order_by_type_rank() {
        let ranked = [json!(3), json!("a"), json!({"k": 1}), json!([1]), json!(false)];
        for pair in ranked.windows(2) {
            assert_eq!(
                compare_values_with_none(Some(&pair[0]), Some(&pair[1])),
                Ordering::Less
            );
            assert_eq!(
                compare_values_with_none(Some(&pair[1]), Some(&pair[0])),
                Ordering::Greater
            );
        }
    }
}
