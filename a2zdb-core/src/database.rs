// src/database.rs
// Database: collection lifecycle, on-disk layout and the transaction
// coordinator (Idle -> Active -> Idle, one transaction at a time).

use crate::collection::Collection;
use crate::document::Document;
use crate::error::{A2zError, Result};
use crate::logging::log_operation;
use crate::transaction::{remove_journal, ActiveTransaction, OperationRecord, TransactionId};
use lazy_static::lazy_static;
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").unwrap();
}

/// Validate a database (or collection) name before any I/O happens
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(A2zError::Validation(
            "Database name cannot be empty".to_string(),
        ));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(A2zError::Validation(
            "Database name can only contain alphanumeric characters, underscores, and hyphens"
                .to_string(),
        ));
    }
    Ok(())
}

/// A named container of collections plus the journal directory for its
/// single optional active transaction.
pub struct Database {
    pub name: String,
    db_path: PathBuf,
    tx_log_path: PathBuf,
    collections: RwLock<HashMap<String, Arc<RwLock<Collection>>>>,
    active: Mutex<Option<ActiveTransaction>>,
}

impl Database {
    /// Open (creating on first use) a database under `root`. Pre-existing
    /// journal files are stale - a crash interrupted their transaction -
    /// and are removed without replay.
    pub fn open(name: &str, root: &Path) -> Result<Database> {
        validate_name(name)?;
        let db_path = root.join(name);
        let tx_log_path = db_path.join(".transactions");
        std::fs::create_dir_all(&db_path)?;
        std::fs::create_dir_all(&tx_log_path)?;

        let db = Database {
            name: name.to_string(),
            db_path,
            tx_log_path,
            collections: RwLock::new(HashMap::new()),
            active: Mutex::new(None),
        };
        db.cleanup_stale_logs()?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Remove leftover journal files from interrupted transactions
    pub fn cleanup_stale_logs(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.tx_log_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("log") {
                match std::fs::remove_file(&path) {
                    Ok(()) => log_operation(
                        "CLEANUP_STALE_LOG",
                        &format!("database:{}", self.name),
                        "SUCCESS",
                        &format!("removed stale transaction log: {}", path.display()),
                    ),
                    Err(e) => {
                        log_operation(
                            "CLEANUP_STALE_LOG",
                            &format!("database:{}", self.name),
                            "FAILED",
                            &e.to_string(),
                        );
                        return Err(A2zError::Io(e));
                    }
                }
            }
        }
        Ok(())
    }

    // ========== COLLECTION LIFECYCLE ==========

    fn collection_path(&self, name: &str) -> PathBuf {
        self.db_path.join(format!("{name}.json"))
    }

    /// Resolve a collection, loading it lazily from disk on first reference
    pub fn collection(&self, name: &str) -> Result<Arc<RwLock<Collection>>> {
        if let Some(existing) = self.collections.read().get(name) {
            return Ok(existing.clone());
        }

        let path = self.collection_path(name);
        if !path.exists() {
            return Err(A2zError::CollectionNotFound(name.to_string()));
        }
        let collection = Arc::new(RwLock::new(Collection::load(name, path, Vec::new())));
        self.collections
            .write()
            .insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    pub fn create_collection(
        &self,
        name: &str,
        indexes: Option<Vec<String>>,
    ) -> Result<Arc<RwLock<Collection>>> {
        validate_name(name)?;
        let path = self.collection_path(name);
        if self.collections.read().contains_key(name) || path.exists() {
            return Err(A2zError::CollectionExists(name.to_string()));
        }

        {
            let mut active = self.active.lock();
            if let Some(tx) = active.as_mut() {
                tx.record(OperationRecord::CreateCollection {
                    collection: name.to_string(),
                    indexes: indexes.clone(),
                    timestamp: OperationRecord::timestamp_now(),
                })?;
            }
        }

        std::fs::write(&path, "[]")?;
        let collection = Arc::new(RwLock::new(Collection::load(
            name,
            path,
            indexes.unwrap_or_default(),
        )));
        self.collections
            .write()
            .insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    /// Drop a collection; returns whether anything was removed. Under a
    /// transaction the full document set is snapshotted for undo first.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        if self.is_in_transaction() {
            if let Ok(collection) = self.collection(name) {
                let documents = collection.read().all_documents();
                let mut active = self.active.lock();
                if let Some(tx) = active.as_mut() {
                    tx.record(OperationRecord::DropCollection {
                        collection: name.to_string(),
                        documents,
                        timestamp: OperationRecord::timestamp_now(),
                    })?;
                }
            }
        }

        let path = self.collection_path(name);
        self.collections.write().remove(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn list_collections(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.db_path)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove the whole database directory. Refused while a transaction is
    /// active.
    pub fn drop_database(&self) -> Result<()> {
        if self.active.lock().is_some() {
            return Err(A2zError::Protocol(
                "Cannot drop database during active transaction".to_string(),
            ));
        }
        std::fs::remove_dir_all(&self.db_path)?;
        self.collections.write().clear();
        Ok(())
    }

    // ========== TRANSACTION COORDINATOR ==========

    pub fn begin_transaction(&self) -> Result<TransactionId> {
        let mut active = self.active.lock();
        if active.is_some() {
            return Err(A2zError::Protocol(
                "Transaction already in progress".to_string(),
            ));
        }
        let tx = ActiveTransaction::begin(&self.tx_log_path)?;
        let id = tx.id().to_string();
        *active = Some(tx);
        log_operation(
            "TRANSACTION",
            &format!("database:{}", self.name),
            "BEGIN",
            &format!("transaction {id} started"),
        );
        Ok(id)
    }

    pub fn is_in_transaction(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn active_transaction_id(&self) -> Option<TransactionId> {
        self.active.lock().as_ref().map(|tx| tx.id().to_string())
    }

    /// Apply the buffered operations in order, persisting after each one,
    /// then drop the journal. An apply failure is fatal to the transaction;
    /// the journal is removed either way and the database returns to Idle.
    pub fn commit(&self) -> Result<()> {
        let tx = self.active.lock().take().ok_or_else(|| {
            A2zError::Protocol("No active transaction to commit".to_string())
        })?;
        let (id, operations, journal_path) = tx.into_parts();

        let mut outcome = Ok(());
        for op in &operations {
            if let Err(e) = self.apply_record(op) {
                outcome = Err(A2zError::FatalTransaction(e.to_string()));
                break;
            }
        }
        remove_journal(&journal_path)?;

        match outcome {
            Ok(()) => {
                log_operation(
                    "TRANSACTION",
                    &format!("database:{}", self.name),
                    "COMMIT",
                    &format!("transaction {id} committed"),
                );
                Ok(())
            }
            Err(e) => {
                log_operation(
                    "TRANSACTION",
                    &format!("database:{}", self.name),
                    "COMMIT_FAILED",
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    /// Undo the buffered operations in reverse order, then drop the journal
    pub fn rollback(&self) -> Result<()> {
        let tx = self.active.lock().take().ok_or_else(|| {
            A2zError::Protocol("No active transaction to rollback".to_string())
        })?;
        let (id, operations, journal_path) = tx.into_parts();

        let mut outcome = Ok(());
        for op in operations.iter().rev() {
            if let Err(e) = self.undo_record(op) {
                outcome = Err(A2zError::FatalTransaction(e.to_string()));
                break;
            }
        }
        remove_journal(&journal_path)?;

        match outcome {
            Ok(()) => {
                log_operation(
                    "TRANSACTION",
                    &format!("database:{}", self.name),
                    "ROLLBACK",
                    &format!("transaction {id} rolled back"),
                );
                Ok(())
            }
            Err(e) => {
                log_operation(
                    "TRANSACTION",
                    &format!("database:{}", self.name),
                    "ROLLBACK_FAILED",
                    &e.to_string(),
                );
                Err(e)
            }
        }
    }

    fn apply_record(&self, op: &OperationRecord) -> Result<()> {
        match op {
            OperationRecord::Insert { .. }
            | OperationRecord::Update { .. }
            | OperationRecord::Delete { .. } => {
                let collection = self.collection(op.collection())?;
                let result = collection.write().apply_operation(op);
                result
            }
            OperationRecord::CreateCollection {
                collection,
                indexes,
                ..
            } => {
                // Usually created at transaction time already; settle if not
                let path = self.collection_path(collection);
                if !path.exists() {
                    std::fs::write(&path, "[]")?;
                    let loaded = Arc::new(RwLock::new(Collection::load(
                        collection,
                        path,
                        indexes.clone().unwrap_or_default(),
                    )));
                    self.collections.write().insert(collection.clone(), loaded);
                }
                Ok(())
            }
            OperationRecord::DropCollection { collection, .. } => {
                let path = self.collection_path(collection);
                self.collections.write().remove(collection);
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(())
            }
        }
    }

    fn undo_record(&self, op: &OperationRecord) -> Result<()> {
        match op {
            OperationRecord::Insert { .. }
            | OperationRecord::Update { .. }
            | OperationRecord::Delete { .. } => match self.collection(op.collection()) {
                Ok(collection) => collection.write().undo_operation(op),
                Err(A2zError::CollectionNotFound(name)) => {
                    log_operation(
                        "TX_ROLLBACK",
                        &format!("database:{}", self.name),
                        "WARNING",
                        &format!("collection {name} not found during rollback"),
                    );
                    Ok(())
                }
                Err(e) => Err(e),
            },
            OperationRecord::CreateCollection { collection, .. } => {
                // The collection was created eagerly; rolling back removes it
                let path = self.collection_path(collection);
                self.collections.write().remove(collection);
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
                Ok(())
            }
            OperationRecord::DropCollection {
                collection,
                documents,
                ..
            } => {
                // Recreate the file from the snapshot taken before the drop
                let path = self.collection_path(collection);
                std::fs::write(&path, serde_json::to_string_pretty(documents)?)?;
                let loaded = Arc::new(RwLock::new(Collection::load(
                    collection,
                    path,
                    Vec::new(),
                )));
                self.collections.write().insert(collection.clone(), loaded);
                Ok(())
            }
        }
    }

    // ========== DOCUMENT OPERATIONS ==========
    // Mutations route through here so the active transaction handle is
    // passed to the collection at the point of entry.

    pub fn insert_one(&self, collection: &str, document: Value) -> Result<String> {
        let coll = self.collection(collection)?;
        let mut active = self.active.lock();
        let result = coll.write().insert_one(document, active.as_mut());
        result
    }

    pub fn insert_many(&self, collection: &str, documents: Vec<Value>) -> Result<Vec<String>> {
        let coll = self.collection(collection)?;
        let mut active = self.active.lock();
        let result = coll.write().insert_many(documents, active.as_mut());
        result
    }

    pub fn update_one(
        &self,
        collection: &str,
        query: &Map<String, Value>,
        update: &Map<String, Value>,
    ) -> Result<bool> {
        let coll = self.collection(collection)?;
        let mut active = self.active.lock();
        let result = coll.write().update_one(query, update, active.as_mut());
        result
    }

    pub fn update_many(
        &self,
        collection: &str,
        query: &Map<String, Value>,
        update: &Map<String, Value>,
    ) -> Result<usize> {
        let coll = self.collection(collection)?;
        let mut active = self.active.lock();
        let result = coll.write().update_many(query, update, active.as_mut());
        result
    }

    pub fn delete_one(&self, collection: &str, query: &Map<String, Value>) -> Result<bool> {
        let coll = self.collection(collection)?;
        let mut active = self.active.lock();
        let result = coll.write().delete_one(query, active.as_mut());
        result
    }

    pub fn delete_many(&self, collection: &str, query: &Map<String, Value>) -> Result<usize> {
        let coll = self.collection(collection)?;
        let mut active = self.active.lock();
        let result = coll.write().delete_many(query, active.as_mut());
        result
    }

    pub fn find(
        &self,
        collection: &str,
        query: Option<&Map<String, Value>>,
    ) -> Result<Vec<Document>> {
        let coll = self.collection(collection)?;
        let result = coll.read().find(query);
        Ok(result)
    }

    pub fn find_one(
        &self,
        collection: &str,
        query: &Map<String, Value>,
    ) -> Result<Option<Document>> {
        let coll = self.collection(collection)?;
        let result = coll.read().find_one(query);
        Ok(result)
    }

    pub fn count_documents(
        &self,
        collection: &str,
        query: Option<&Map<String, Value>>,
    ) -> Result<usize> {
        let coll = self.collection(collection)?;
        let result = coll.read().count_documents(query);
        Ok(result)
    }

    pub fn aggregate(&self, collection: &str, pipeline: &Value) -> Result<Vec<Value>> {
        let coll = self.collection(collection)?;
        let result = coll.read().aggregate(pipeline);
        result
    }

    pub fn create_index(&self, collection: &str, field: &str) -> Result<()> {
        let coll = self.collection(collection)?;
        let result = coll.write().create_index(field);
        result
    }

    pub fn enable_indexing(&self, collection: &str, enabled: bool) -> Result<()> {
        let coll = self.collection(collection)?;
        coll.write().enable_indexing(enabled);
        Ok(())
    }

    pub fn list_indexes(&self, collection: &str) -> Result<Vec<Value>> {
        let coll = self.collection(collection)?;
        let result = coll.read().list_indexes();
        Ok(result)
    }
}
