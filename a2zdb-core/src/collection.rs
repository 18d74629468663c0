// src/collection.rs
// Collection engine: document sequence, id map, hash indexes, CRUD and
// query execution with index selection.
//
// Transactional calls receive the database's ActiveTransaction handle; the
// collection journals through it and mirrors inserts/deletes into the
// sequence so reads inside the transaction see tentative state. Posting
// maps stay cold until commit.

use crate::aggregation::Pipeline;
use crate::document::Document;
use crate::error::{A2zError, Result};
use crate::index::{IndexKey, IndexManager};
use crate::logging::log_operation;
use crate::query::matches;
use crate::transaction::{ActiveTransaction, OperationRecord};
use crate::update::UpdateSpec;
use ahash::AHashMap;
use serde_json::{Map, Value};
use std::path::PathBuf;

pub struct Collection {
    pub name: String,
    file_path: PathBuf,
    documents: Vec<Document>,
    id_map: AHashMap<String, usize>,
    indexes: IndexManager,
    indexing_enabled: bool,
}

impl Collection {
    // ========== CONSTRUCTOR / PERSISTENCE ==========

    /// Load a collection from its JSON-array file. A missing, empty or
    /// malformed file is an empty collection.
    pub fn load(name: &str, file_path: PathBuf, indexed_fields: Vec<String>) -> Collection {
        let documents = match std::fs::read_to_string(&file_path) {
            Ok(text) => match serde_json::from_str::<Vec<Document>>(&text) {
                Ok(docs) => {
                    log_operation(
                        "DATA_LOAD",
                        &format!("collection:{name}"),
                        "SUCCESS",
                        &format!("loaded {} documents", docs.len()),
                    );
                    docs
                }
                Err(e) => {
                    log_operation(
                        "DATA_LOAD",
                        &format!("collection:{name}"),
                        "INITIALIZED",
                        &format!("new collection created - {e}"),
                    );
                    Vec::new()
                }
            },
            Err(e) => {
                log_operation(
                    "DATA_LOAD",
                    &format!("collection:{name}"),
                    "INITIALIZED",
                    &format!("new collection created - {e}"),
                );
                Vec::new()
            }
        };

        let mut collection = Collection {
            name: name.to_string(),
            file_path,
            documents,
            id_map: AHashMap::new(),
            indexes: IndexManager::new(indexed_fields),
            indexing_enabled: false,
        };
        collection.rebuild_id_map();
        collection.indexes.rebuild(&collection.documents);
        log_operation(
            "COLLECTION_INIT",
            &format!("collection:{}", collection.name),
            "COMPLETED",
            &format!(
                "path:{}, indexes:{:?}, documents:{}",
                collection.file_path.display(),
                collection.indexes.fields(),
                collection.documents.len()
            ),
        );
        collection
    }

    /// Persist the sequence as a JSON array. Only called outside
    /// transactions and during commit apply.
    fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.documents)?;
        match std::fs::write(&self.file_path, text) {
            Ok(()) => {
                log_operation(
                    "DATA_SAVE",
                    &format!("collection:{}", self.name),
                    "SUCCESS",
                    &format!("saved {} documents", self.documents.len()),
                );
                Ok(())
            }
            Err(e) => {
                log_operation(
                    "DATA_SAVE",
                    &format!("collection:{}", self.name),
                    "FAILED",
                    &e.to_string(),
                );
                Err(A2zError::Io(e))
            }
        }
    }

    fn rebuild_id_map(&mut self) {
        self.id_map = self
            .documents
            .iter()
            .enumerate()
            .map(|(i, doc)| (doc.id().to_string(), i))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    // ========== INSERT ==========

    pub fn insert_one(
        &mut self,
        document: Value,
        tx: Option<&mut ActiveTransaction>,
    ) -> Result<String> {
        let mut doc = Document::from_value(document)?;
        let id = doc.ensure_id()?;
        if self.id_map.contains_key(&id) {
            return Err(A2zError::Validation(format!("duplicate _id: {id}")));
        }

        if let Some(tx) = tx {
            tx.record(OperationRecord::Insert {
                collection: self.name.clone(),
                document: doc.clone(),
                timestamp: OperationRecord::timestamp_now(),
            })?;
            // Tentative state: visible to reads within the transaction,
            // indexed only at commit
            self.id_map.insert(id.clone(), self.documents.len());
            self.documents.push(doc);
            return Ok(id);
        }

        self.id_map.insert(id.clone(), self.documents.len());
        self.documents.push(doc);
        let idx = self.documents.len() - 1;
        self.indexes.index_document(&self.documents[idx]);
        self.save()?;
        log_operation(
            "DOCUMENT_INSERT",
            &format!("collection:{}", self.name),
            "SUCCESS",
            &format!("id:{id}"),
        );
        Ok(id)
    }

    /// Insert a batch. Not atomic on its own: ids are assigned up front and
    /// a failure surfaces after earlier documents landed; wrap in a
    /// transaction for all-or-nothing behavior.
    pub fn insert_many(
        &mut self,
        documents: Vec<Value>,
        tx: Option<&mut ActiveTransaction>,
    ) -> Result<Vec<String>> {
        let mut docs = Vec::with_capacity(documents.len());
        let mut ids = Vec::with_capacity(documents.len());
        for value in documents {
            let mut doc = Document::from_value(value)?;
            let id = doc.ensure_id()?;
            if self.id_map.contains_key(&id) || ids.contains(&id) {
                return Err(A2zError::Validation(format!("duplicate _id: {id}")));
            }
            ids.push(id);
            docs.push(doc);
        }

        if let Some(tx) = tx {
            for doc in docs {
                tx.record(OperationRecord::Insert {
                    collection: self.name.clone(),
                    document: doc.clone(),
                    timestamp: OperationRecord::timestamp_now(),
                })?;
                self.id_map.insert(doc.id().to_string(), self.documents.len());
                self.documents.push(doc);
            }
            return Ok(ids);
        }

        for doc in docs {
            self.id_map.insert(doc.id().to_string(), self.documents.len());
            self.documents.push(doc);
            let idx = self.documents.len() - 1;
            self.indexes.index_document(&self.documents[idx]);
        }
        self.save()?;
        log_operation(
            "DOCUMENT_INSERT_MANY",
            &format!("collection:{}", self.name),
            "SUCCESS",
            &format!("inserted {} documents", ids.len()),
        );
        Ok(ids)
    }

    // ========== UPDATE ==========

    /// Mutate the first match in sequence order
    pub fn update_one(
        &mut self,
        query: &Map<String, Value>,
        update: &Map<String, Value>,
        tx: Option<&mut ActiveTransaction>,
    ) -> Result<bool> {
        let spec = UpdateSpec::parse(update)?;
        let Some(i) = self.documents.iter().position(|doc| matches(doc, query)) else {
            log_operation(
                "DOCUMENT_UPDATE",
                &format!("collection:{}", self.name),
                "NOT_FOUND",
                &format!("query:{}", Value::Object(query.clone())),
            );
            return Ok(false);
        };

        let in_tx = tx.is_some();
        self.apply_update_at(i, &spec, tx)?;
        if !in_tx {
            self.save()?;
        }
        log_operation(
            "DOCUMENT_UPDATE",
            &format!("collection:{}", self.name),
            "SUCCESS",
            &format!("id:{}", self.documents[i].id()),
        );
        Ok(true)
    }

    /// Mutate every match in sequence order; returns the count
    pub fn update_many(
        &mut self,
        query: &Map<String, Value>,
        update: &Map<String, Value>,
        mut tx: Option<&mut ActiveTransaction>,
    ) -> Result<usize> {
        let spec = UpdateSpec::parse(update)?;
        let mut count = 0;
        for i in 0..self.documents.len() {
            if !matches(&self.documents[i], query) {
                continue;
            }
            self.apply_update_at(i, &spec, tx.as_deref_mut())?;
            count += 1;
        }
        if count > 0 && tx.is_none() {
            self.save()?;
        }
        log_operation(
            "DOCUMENT_UPDATE_MANY",
            &format!("collection:{}", self.name),
            "SUCCESS",
            &format!("updated {count} documents"),
        );
        Ok(count)
    }

    /// Shared single-document update path. Transactional updates capture the
    /// pre-image for rollback and leave the posting maps untouched; direct
    /// updates reindex immediately. Callers persist afterwards.
    fn apply_update_at(
        &mut self,
        i: usize,
        spec: &UpdateSpec,
        tx: Option<&mut ActiveTransaction>,
    ) -> Result<()> {
        let before = self.documents[i].clone();
        let mut updated = before.clone();
        spec.apply(&mut updated)?;

        match tx {
            Some(tx) => {
                tx.record(OperationRecord::Update {
                    collection: self.name.clone(),
                    doc_id: before.id().to_string(),
                    original_doc: before,
                    mutation: spec.clone(),
                    timestamp: OperationRecord::timestamp_now(),
                })?;
                self.documents[i] = updated;
            }
            None => {
                self.documents[i] = updated;
                self.indexes.reindex_document(&before, &self.documents[i]);
            }
        }
        Ok(())
    }

    // ========== DELETE ==========

    /// Remove the first match in sequence order
    pub fn delete_one(
        &mut self,
        query: &Map<String, Value>,
        tx: Option<&mut ActiveTransaction>,
    ) -> Result<bool> {
        let Some(i) = self.documents.iter().position(|doc| matches(doc, query)) else {
            log_operation(
                "DOCUMENT_DELETE",
                &format!("collection:{}", self.name),
                "NOT_FOUND",
                &format!("query:{}", Value::Object(query.clone())),
            );
            return Ok(false);
        };

        match tx {
            Some(tx) => {
                let doc = self.documents[i].clone();
                tx.record(OperationRecord::Delete {
                    collection: self.name.clone(),
                    doc_id: doc.id().to_string(),
                    document: doc,
                    timestamp: OperationRecord::timestamp_now(),
                })?;
                // Mirror the removal; postings keep the entry until commit
                self.documents.remove(i);
                self.rebuild_id_map();
            }
            None => {
                let doc = self.documents.remove(i);
                self.indexes.remove_document(&doc);
                self.rebuild_id_map();
                self.save()?;
                log_operation(
                    "DOCUMENT_DELETE",
                    &format!("collection:{}", self.name),
                    "SUCCESS",
                    &format!("id:{}", doc.id()),
                );
            }
        }
        Ok(true)
    }

    /// Remove every match; returns the count
    pub fn delete_many(
        &mut self,
        query: &Map<String, Value>,
        mut tx: Option<&mut ActiveTransaction>,
    ) -> Result<usize> {
        let mut kept = Vec::with_capacity(self.documents.len());
        let mut removed = Vec::new();
        for doc in std::mem::take(&mut self.documents) {
            if matches(&doc, query) {
                removed.push(doc);
            } else {
                kept.push(doc);
            }
        }
        self.documents = kept;
        let count = removed.len();

        for doc in removed {
            match tx.as_deref_mut() {
                Some(tx) => {
                    tx.record(OperationRecord::Delete {
                        collection: self.name.clone(),
                        doc_id: doc.id().to_string(),
                        document: doc,
                        timestamp: OperationRecord::timestamp_now(),
                    })?;
                }
                None => self.indexes.remove_document(&doc),
            }
        }
        self.rebuild_id_map();
        if count > 0 && tx.is_none() {
            self.save()?;
        }
        log_operation(
            "DOCUMENT_DELETE_MANY",
            &format!("collection:{}", self.name),
            "SUCCESS",
            &format!("deleted {count} documents"),
        );
        Ok(count)
    }

    // ========== QUERIES ==========

    /// Find documents matching the query. With indexing enabled, the first
    /// indexed top-level field with a scalar-equality / `$eq` / `$in`
    /// condition selects an index plan; candidates are re-filtered with the
    /// full predicate. Results always come back in insertion order.
    pub fn find(&self, query: Option<&Map<String, Value>>) -> Vec<Document> {
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            log_operation(
                "QUERY_EXECUTE",
                &format!("collection:{}", self.name),
                "FULL_SCAN",
                "no query provided",
            );
            return self.documents.clone();
        };

        if self.indexing_enabled {
            if let Some((field, positions)) = self.plan_candidates(query) {
                let results: Vec<Document> = positions
                    .into_iter()
                    .filter(|&i| matches(&self.documents[i], query))
                    .map(|i| self.documents[i].clone())
                    .collect();
                log_operation(
                    "QUERY_EXECUTE",
                    &format!("collection:{}", self.name),
                    "INDEX_USED",
                    &format!("field:{field}, results:{}", results.len()),
                );
                return results;
            }
        }

        let results: Vec<Document> = self
            .documents
            .iter()
            .filter(|doc| matches(doc, query))
            .cloned()
            .collect();
        log_operation(
            "QUERY_EXECUTE",
            &format!("collection:{}", self.name),
            "FULL_SCAN",
            &format!("results:{}", results.len()),
        );
        results
    }

    /// First matching document in sequence order
    pub fn find_one(&self, query: &Map<String, Value>) -> Option<Document> {
        if self.indexing_enabled && !query.is_empty() {
            if let Some((_, positions)) = self.plan_candidates(query) {
                return positions
                    .into_iter()
                    .find(|&i| matches(&self.documents[i], query))
                    .map(|i| self.documents[i].clone());
            }
        }
        self.documents.iter().find(|doc| matches(doc, query)).cloned()
    }

    pub fn count_documents(&self, query: Option<&Map<String, Value>>) -> usize {
        match query.filter(|q| !q.is_empty()) {
            Some(query) => self.find(Some(query)).len(),
            None => self.documents.len(),
        }
    }

    /// Select an index plan: walk the query's top-level fields in iteration
    /// order; the first indexed field with an equality-shaped condition
    /// wins. Returns sequence positions sorted into insertion order.
    fn plan_candidates(&self, query: &Map<String, Value>) -> Option<(String, Vec<usize>)> {
        for (field, condition) in query {
            if !self.indexes.has_field(field) {
                continue;
            }
            let ids = match condition {
                Value::Object(cond) => {
                    if let Some(operand) = cond.get("$eq") {
                        self.indexes.lookup(field, &IndexKey::from(operand))
                    } else if let Some(Value::Array(operands)) = cond.get("$in") {
                        let keys: Vec<IndexKey> = operands.iter().map(IndexKey::from).collect();
                        self.indexes.lookup_many(field, &keys)
                    } else {
                        continue;
                    }
                }
                scalar => self.indexes.lookup(field, &IndexKey::from(scalar)),
            };

            let mut positions: Vec<usize> = ids
                .iter()
                .filter_map(|id| self.id_map.get(id).copied())
                .collect();
            positions.sort_unstable();
            return Some((field.clone(), positions));
        }
        None
    }

    pub fn aggregate(&self, pipeline: &Value) -> Result<Vec<Value>> {
        let pipeline = Pipeline::from_json(pipeline)?;
        let working_set: Vec<Value> = self.documents.iter().map(Document::to_value).collect();
        pipeline.execute(working_set)
    }

    // ========== INDEX OPERATIONS ==========

    pub fn create_index(&mut self, field: &str) -> Result<()> {
        if let Err(e) = self.indexes.create(field) {
            log_operation(
                "INDEX_CREATE",
                &format!("collection:{}", self.name),
                "FAILED",
                &e.to_string(),
            );
            return Err(e);
        }
        self.indexes.rebuild(&self.documents);
        log_operation(
            "INDEX_CREATE",
            &format!("collection:{}", self.name),
            "SUCCESS",
            &format!("field:{field}"),
        );
        Ok(())
    }

    pub fn enable_indexing(&mut self, enabled: bool) {
        self.indexing_enabled = enabled;
        log_operation(
            "INDEX_TOGGLE",
            &format!("collection:{}", self.name),
            "SUCCESS",
            &format!("indexing_enabled:{enabled}"),
        );
    }

    pub fn indexing_enabled(&self) -> bool {
        self.indexing_enabled
    }

    pub fn list_indexes(&self) -> Vec<Value> {
        self.indexes.list()
    }

    // ========== TRANSACTION APPLY / UNDO ==========

    /// Re-execute a journal record permanently during commit. Idempotent on
    /// the sequence: tentative inserts/deletes were already mirrored at
    /// transaction time, so apply only settles placement, indexes and disk.
    pub fn apply_operation(&mut self, op: &OperationRecord) -> Result<()> {
        match op {
            OperationRecord::Insert { document, .. } => {
                let id = document.id().to_string();
                if !self.id_map.contains_key(&id) {
                    self.id_map.insert(id.clone(), self.documents.len());
                    self.documents.push(document.clone());
                }
                if let Some(&i) = self.id_map.get(&id) {
                    self.indexes.index_document(&self.documents[i]);
                }
                self.save()?;
            }
            OperationRecord::Update {
                doc_id,
                original_doc,
                mutation,
                ..
            } => {
                if let Some(i) = self.id_map.get(doc_id).copied() {
                    let current = self.documents[i].clone();
                    match mutation {
                        // The tentative push already landed in the sequence;
                        // replaying it would append the element twice
                        UpdateSpec::Push(_) => {}
                        spec => {
                            let mut updated = current.clone();
                            spec.apply(&mut updated)?;
                            self.documents[i] = updated;
                        }
                    }
                    // Pre-image entries leave the postings, current state
                    // enters them
                    self.indexes.remove_document(original_doc);
                    self.indexes.index_document(&self.documents[i]);
                }
                self.save()?;
            }
            OperationRecord::Delete {
                doc_id, document, ..
            } => {
                if let Some(i) = self.id_map.get(doc_id).copied() {
                    let removed = self.documents.remove(i);
                    self.indexes.remove_document(&removed);
                    self.rebuild_id_map();
                }
                // The snapshot's posting entries also go: the mirror removed
                // the document from the sequence at transaction time, but
                // its index entries survived until now
                self.indexes.remove_document(document);
                self.save()?;
            }
            // Collection lifecycle records are settled by the database
            OperationRecord::CreateCollection { .. } | OperationRecord::DropCollection { .. } => {}
        }
        Ok(())
    }

    /// Reverse a journal record during rollback. Never persists: the disk
    /// was not touched while the transaction was active, so restoring the
    /// in-memory state leaves the database byte-identical to pre-begin.
    pub fn undo_operation(&mut self, op: &OperationRecord) -> Result<()> {
        match op {
            OperationRecord::Insert { document, .. } => {
                if let Some(i) = self.id_map.get(document.id()).copied() {
                    let removed = self.documents.remove(i);
                    self.indexes.remove_document(&removed);
                    self.rebuild_id_map();
                }
            }
            OperationRecord::Update {
                doc_id,
                original_doc,
                ..
            } => {
                if let Some(i) = self.id_map.get(doc_id).copied() {
                    let current =
                        std::mem::replace(&mut self.documents[i], original_doc.clone());
                    self.indexes.remove_document(&current);
                    self.indexes.index_document(&self.documents[i]);
                }
            }
            OperationRecord::Delete { document, .. } => {
                if !self.id_map.contains_key(document.id()) {
                    self.id_map
                        .insert(document.id().to_string(), self.documents.len());
                    self.documents.push(document.clone());
                    let idx = self.documents.len() - 1;
                    self.indexes.index_document(&self.documents[idx]);
                }
            }
            OperationRecord::CreateCollection { .. } | OperationRecord::DropCollection { .. } => {}
        }
        Ok(())
    }

    /// Snapshot of the whole sequence (drop-collection undo records)
    pub fn all_documents(&self) -> Vec<Document> {
        self.documents.clone()
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        use crate::index::IndexKey;

        // Sequence and id map are 1:1
        assert_eq!(self.documents.len(), self.id_map.len());
        for (i, doc) in self.documents.iter().enumerate() {
            assert_eq!(self.id_map.get(doc.id()), Some(&i));
        }

        // Posting maps mirror the sequence exactly, no empty entries
        for field in self.indexes.fields().to_vec() {
            for doc in &self.documents {
                if let Some(value) = doc.fields().get(&field) {
                    let key = IndexKey::from(value);
                    let ids = self
                        .indexes
                        .posting_entry(&field, &key)
                        .unwrap_or_else(|| panic!("missing posting for {field}"));
                    assert!(ids.iter().any(|id| id == doc.id()));
                }
            }
            if let Some(map) = self.indexes.posting_map(&field) {
                for (key, ids) in map {
                    assert!(!ids.is_empty(), "empty posting entry for {field}");
                    for id in ids {
                        let i = self.id_map[id.as_str()];
                        let stored = self.documents[i].fields().get(&field).unwrap();
                        assert_eq!(&IndexKey::from(stored), key);
                    }
                }
            }
        }
    }
}
