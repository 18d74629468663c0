// src/index.rs
// Hash-index manager: field -> value -> posting list of document ids

use crate::document::Document;
use crate::error::{A2zError, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Hashable index key derived from a JSON field value.
///
/// Scalars map to their own variants; arrays and objects canonicalize to
/// their JSON text under a dedicated variant so they can never collide with
/// a plain string value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat),
    String(String),
    Composite(String),
}

/// OrderedFloat wrapper for f64 to enable Eq/Hash (bit-pattern identity)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl From<&Value> for IndexKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    IndexKey::Int(i)
                } else if let Some(f) = n.as_f64() {
                    IndexKey::Float(OrderedFloat(f))
                } else {
                    IndexKey::Null
                }
            }
            Value::String(s) => IndexKey::String(s.clone()),
            composite => IndexKey::Composite(composite.to_string()),
        }
    }
}

/// Posting-map indexes for one collection.
///
/// Invariants maintained across every mutation:
/// - a document id appears in `postings[f][v]` iff the document's top-level
///   field `f` currently holds `v`,
/// - no posting entry is empty (pruned on removal).
#[derive(Debug, Clone, Default)]
pub struct IndexManager {
    fields: Vec<String>,
    postings: AHashMap<String, AHashMap<IndexKey, Vec<String>>>,
}

impl IndexManager {
    /// Index manager with the given declared fields (posting maps start empty)
    pub fn new(fields: Vec<String>) -> Self {
        let postings = fields
            .iter()
            .map(|f| (f.clone(), AHashMap::new()))
            .collect();
        IndexManager { fields, postings }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// Declare an index on a new field. Creating an existing index is a
    /// conflict; the caller rebuilds afterwards.
    pub fn create(&mut self, field: &str) -> Result<()> {
        if self.has_field(field) {
            return Err(A2zError::IndexExists(field.to_string()));
        }
        self.fields.push(field.to_string());
        self.postings.insert(field.to_string(), AHashMap::new());
        Ok(())
    }

    /// Rebuild every posting map by scanning the sequence. Idempotent.
    pub fn rebuild(&mut self, documents: &[Document]) {
        for field in &self.fields {
            self.postings.insert(field.clone(), AHashMap::new());
        }
        for doc in documents {
            self.index_document(doc);
        }
    }

    /// Add a document's indexed fields to the posting maps
    pub fn index_document(&mut self, doc: &Document) {
        let id = doc.id();
        if id.is_empty() {
            return;
        }
        for field in &self.fields {
            if let Some(value) = doc.fields().get(field) {
                let key = IndexKey::from(value);
                if let Some(map) = self.postings.get_mut(field) {
                    let ids = map.entry(key).or_default();
                    // Guard against duplicate insertion of the same id
                    if !ids.iter().any(|existing| existing == id) {
                        ids.push(id.to_string());
                    }
                }
            }
        }
    }

    /// Remove a document's indexed fields from the posting maps, pruning
    /// entries that become empty
    pub fn remove_document(&mut self, doc: &Document) {
        let id = doc.id();
        for field in &self.fields {
            if let Some(value) = doc.fields().get(field) {
                let key = IndexKey::from(value);
                if let Some(map) = self.postings.get_mut(field) {
                    if let Some(ids) = map.get_mut(&key) {
                        ids.retain(|existing| existing != id);
                        if ids.is_empty() {
                            map.remove(&key);
                        }
                    }
                }
            }
        }
    }

    /// Update semantics: delete-then-insert against pre- and post-image
    pub fn reindex_document(&mut self, before: &Document, after: &Document) {
        self.remove_document(before);
        self.index_document(after);
    }

    /// Posting list for one (field, value) pair; empty when absent
    pub fn lookup(&self, field: &str, key: &IndexKey) -> Vec<String> {
        self.postings
            .get(field)
            .and_then(|map| map.get(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Union of posting lists for several keys, de-duplicated, first-seen order
    pub fn lookup_many(&self, field: &str, keys: &[IndexKey]) -> Vec<String> {
        let mut seen = ahash::AHashSet::new();
        let mut ids = Vec::new();
        for key in keys {
            for id in self.lookup(field, key) {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Index descriptions in the surface format: `{name, key}`
    pub fn list(&self) -> Vec<Value> {
        self.fields
            .iter()
            .map(|field| json!({"name": format!("{field}_index"), "key": field}))
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn posting_entry(&self, field: &str, key: &IndexKey) -> Option<&Vec<String>> {
        self.postings.get(field).and_then(|map| map.get(key))
    }

    #[cfg(test)]
    pub(crate) fn posting_map(&self, field: &str) -> Option<&AHashMap<IndexKey, Vec<String>>> {
        self.postings.get(field)
    }
}
