//! Value utility functions shared across modules
//!
//! Dotted-path reads, deep merges and value comparison over
//! `serde_json::Value`, used by the matcher, indexes and aggregation.

use serde_json::Value;
use std::cmp::Ordering;

/// Get a nested value with dot notation support
///
/// Supports simple fields (`"name"`) and nested objects (`"address.city"`).
/// A leading `$` is stripped first, so aggregation field references
/// (`"$address.city"`) resolve the same way. Returns `None` when a path
/// segment is missing or traverses a non-object.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use a2zdb_core::value_utils::get_path;
///
/// let doc = json!({"address": {"city": "Ludhiana"}});
/// assert_eq!(get_path(&doc, "address.city"), Some(&json!("Ludhiana")));
/// assert_eq!(get_path(&doc, "$address.city"), Some(&json!("Ludhiana")));
/// ```
pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix('$').unwrap_or(path);

    // Fast path: no dots means simple field access
    if !path.contains('.') {
        return doc.get(path);
    }

    let mut value = doc;
    for part in path.split('.') {
        match value {
            Value::Object(map) => value = map.get(part)?,
            _ => return None,
        }
    }
    Some(value)
}

/// Recursively merge `source` into `target`
///
/// Object values merge key by key; everything else overwrites. This is the
/// `$set` semantics: `{"a": {"b": 1}}` merged with `{"a": {"c": 2}}` keeps
/// both `b` and `c`.
pub fn deep_merge(target: &mut serde_json::Map<String, Value>, source: &serde_json::Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Compare two JSON values
///
/// Returns `Some(Ordering)` for comparable types (numbers, strings,
/// booleans), `None` for incompatible pairs (e.g. string vs number).
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use std::cmp::Ordering;
/// use a2zdb_core::value_utils::compare_values;
///
/// assert_eq!(compare_values(&json!(10), &json!(5)), Some(Ordering::Greater));
/// assert_eq!(compare_values(&json!("a"), &json!(1)), None);
/// ```
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(n1), Value::Number(n2)) => {
            let f1 = n1.as_f64()?;
            let f2 = n2.as_f64()?;
            f1.partial_cmp(&f2)
        }
        (Value::String(s1), Value::String(s2)) => Some(s1.cmp(s2)),
        (Value::Bool(b1), Value::Bool(b2)) => Some(b1.cmp(b2)),
        _ => None,
    }
}

/// Compare two optional JSON values with None handling
///
/// Used for sorting where missing values need consistent ordering:
/// None sorts before any actual value; incompatible pairs compare Equal
/// (keeps the sort stable).
pub fn compare_values_with_none(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(av), Some(bv)) => compare_values(av, bv).unwrap_or(Ordering::Equal),
    }
}
