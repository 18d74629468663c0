// src/document.rs
// JSON-object document with a mandatory string _id

use crate::error::{A2zError, Result};
use crate::value_utils::{deep_merge, get_path};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A single stored document: a JSON object whose `_id` field is a unique
/// string within its collection. `_id` is server-assigned (UUID v4) when the
/// caller omits it, and immutable afterwards.
///
/// `_id` lives in the map like any other field, so query matching and
/// serialization need no special casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Wrap an existing JSON object
    pub fn new(fields: Map<String, Value>) -> Self {
        Document { fields }
    }

    /// Build a document from an arbitrary JSON value.
    ///
    /// Anything other than an object is a validation error.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Document { fields }),
            other => Err(A2zError::Validation(format!(
                "Document must be an object, got: {other}"
            ))),
        }
    }

    /// Assign a fresh UUID v4 `_id` when absent; returns the document id.
    ///
    /// A present `_id` must already be a string.
    pub fn ensure_id(&mut self) -> Result<String> {
        match self.fields.get("_id") {
            None => {
                let id = Uuid::new_v4().to_string();
                self.fields.insert("_id".to_string(), Value::String(id.clone()));
                Ok(id)
            }
            Some(Value::String(id)) => Ok(id.clone()),
            Some(other) => Err(A2zError::Validation(format!(
                "_id must be a string, got: {other}"
            ))),
        }
    }

    /// The document id. Documents held by a collection always carry one;
    /// a missing or non-string `_id` reads as the empty string, which never
    /// names a stored document.
    pub fn id(&self) -> &str {
        self.fields
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Field lookup with dot-notation support (`"address.city"`)
    pub fn get(&self, path: &str) -> Option<&Value> {
        if !path.contains('.') {
            return self.fields.get(path);
        }
        // Route nested paths through the shared traversal
        let root = self.fields.get(path.split('.').next()?)?;
        get_path(root, &path[path.find('.')? + 1..])
    }

    /// Top-level field presence
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Set a top-level field
    pub fn set(&mut self, field: String, value: Value) {
        self.fields.insert(field, value);
    }

    /// Remove a top-level field
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Deep-merge an object into this document (`$set` semantics)
    pub fn merge(&mut self, source: &Map<String, Value>) {
        deep_merge(&mut self.fields, source);
    }

    /// Append to an array field (`$push` semantics): a missing field becomes
    /// a one-element array, a non-array target is a validation error.
    pub fn push(&mut self, field: &str, value: Value) -> Result<()> {
        match self.fields.get_mut(field) {
            None => {
                self.fields
                    .insert(field.to_string(), Value::Array(vec![value]));
                Ok(())
            }
            Some(Value::Array(items)) => {
                items.push(value);
                Ok(())
            }
            Some(_) => Err(A2zError::Validation(format!(
                "Cannot push to non-array field: {field}"
            ))),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Document as a JSON value (cheap clone of the map)
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.fields)
    }
}
