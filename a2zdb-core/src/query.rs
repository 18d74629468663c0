// src/query.rs
// Predicate matcher for the query dialect

use crate::document::Document;
use crate::value_utils::compare_values;
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// The closed set of query operators.
///
/// Anything else appearing in operator position fails the match; operators
/// are never silently treated as field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    In,
}

impl QueryOperator {
    pub fn parse(name: &str) -> Option<QueryOperator> {
        match name {
            "$eq" => Some(QueryOperator::Eq),
            "$ne" => Some(QueryOperator::Ne),
            "$gt" => Some(QueryOperator::Gt),
            "$lt" => Some(QueryOperator::Lt),
            "$in" => Some(QueryOperator::In),
            _ => None,
        }
    }
}

/// Check whether a document matches a query.
///
/// Each `(field, condition)` pair must hold:
/// - an absent field fails,
/// - a condition map whose keys all start with `$` is an operator
///   conjunction,
/// - any other condition map is a nested predicate (the stored value must
///   itself be an object and match recursively),
/// - a scalar condition is exact equality.
///
/// Ordering operators over incomparable types fail the match rather than
/// erroring.
pub fn matches(doc: &Document, query: &Map<String, Value>) -> bool {
    matches_map(doc.fields(), query)
}

/// Same as [`matches`] for a raw JSON object (aggregation working sets)
pub fn matches_map(doc: &Map<String, Value>, query: &Map<String, Value>) -> bool {
    for (field, condition) in query {
        let doc_value = match doc.get(field) {
            Some(v) => v,
            None => return false,
        };

        match condition {
            Value::Object(cond) if is_operator_map(cond) => {
                for (op_name, operand) in cond {
                    let op = match QueryOperator::parse(op_name) {
                        Some(op) => op,
                        None => return false,
                    };
                    if !apply_operator(op, doc_value, operand) {
                        return false;
                    }
                }
            }
            Value::Object(nested) => {
                // Nested predicate: the stored value must be an object too
                match doc_value {
                    Value::Object(inner) => {
                        if !matches_map(inner, nested) {
                            return false;
                        }
                    }
                    _ => return false,
                }
            }
            scalar => {
                if doc_value != scalar {
                    return false;
                }
            }
        }
    }
    true
}

fn is_operator_map(cond: &Map<String, Value>) -> bool {
    !cond.is_empty() && cond.keys().all(|k| k.starts_with('$'))
}

fn apply_operator(op: QueryOperator, doc_value: &Value, operand: &Value) -> bool {
    match op {
        QueryOperator::Eq => doc_value == operand,
        QueryOperator::Ne => doc_value != operand,
        QueryOperator::Gt => compare_values(doc_value, operand) == Some(Ordering::Greater),
        QueryOperator::Lt => compare_values(doc_value, operand) == Some(Ordering::Less),
        QueryOperator::In => match operand {
            Value::Array(candidates) => candidates.contains(doc_value),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn query(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_empty_query_matches_everything() {
        let d = doc(json!({"_id": "1", "name": "Alice"}));
        assert!(matches(&d, &query(json!({}))));
    }

    #[test]
    fn test_scalar_equality() {
        let d = doc(json!({"_id": "1", "name": "Alice", "age": 30}));
        assert!(matches(&d, &query(json!({"name": "Alice"}))));
        assert!(matches(&d, &query(json!({"name": "Alice", "age": 30}))));
        assert!(!matches(&d, &query(json!({"name": "Bob"}))));
    }

    #[test]
    fn test_absent_field_fails() {
        let d = doc(json!({"_id": "1"}));
        assert!(!matches(&d, &query(json!({"missing": 1}))));
        assert!(!matches(&d, &query(json!({"missing": {"$ne": 1}}))));
    }

    #[test]
    fn test_comparison_operators() {
        let d = doc(json!({"_id": "1", "price": 20}));
        assert!(matches(&d, &query(json!({"price": {"$gt": 10}}))));
        assert!(matches(&d, &query(json!({"price": {"$lt": 30}}))));
        assert!(!matches(&d, &query(json!({"price": {"$gt": 20}}))));
        assert!(matches(&d, &query(json!({"price": {"$gt": 10, "$lt": 25}}))));
        assert!(!matches(&d, &query(json!({"price": {"$gt": 10, "$lt": 15}}))));
    }

    #[test]
    fn test_eq_ne_operators() {
        let d = doc(json!({"_id": "1", "status": "active"}));
        assert!(matches(&d, &query(json!({"status": {"$eq": "active"}}))));
        assert!(!matches(&d, &query(json!({"status": {"$ne": "active"}}))));
        assert!(matches(&d, &query(json!({"status": {"$ne": "archived"}}))));
    }

    #[test]
    fn test_in_operator() {
        let d = doc(json!({"_id": "1", "city": "Patiala"}));
        assert!(matches(&d, &query(json!({"city": {"$in": ["Patiala", "Mohali"]}}))));
        assert!(!matches(&d, &query(json!({"city": {"$in": ["Delhi"]}}))));
        // Non-array operand never matches
        assert!(!matches(&d, &query(json!({"city": {"$in": "Patiala"}}))));
    }

    #[test]
    fn test_unknown_operator_fails_match() {
        let d = doc(json!({"_id": "1", "age": 30}));
        assert!(!matches(&d, &query(json!({"age": {"$gte": 18}}))));
    }

    #[test]
    fn test_incomparable_ordering_fails_match() {
        let d = doc(json!({"_id": "1", "name": "Alice"}));
        assert!(!matches(&d, &query(json!({"name": {"$gt": 5}}))));
    }

    #[test]
    fn test_nested_predicate() {
        let d = doc(json!({"_id": "1", "address": {"city": "Patiala", "zip": 147001}}));
        assert!(matches(&d, &query(json!({"address": {"city": "Patiala"}}))));
        assert!(!matches(&d, &query(json!({"address": {"city": "Delhi"}}))));
        // Nested predicate against a scalar value fails
        let d2 = doc(json!({"_id": "2", "address": "Patiala"}));
        assert!(!matches(&d2, &query(json!({"address": {"city": "Patiala"}}))));
    }

    #[test]
    fn test_nested_predicate_with_operators_inside() {
        let d = doc(json!({"_id": "1", "stats": {"visits": 12}}));
        assert!(matches(&d, &query(json!({"stats": {"visits": {"$gt": 10}}}))));
        assert!(!matches(&d, &query(json!({"stats": {"visits": {"$lt": 10}}}))));
    }
}
