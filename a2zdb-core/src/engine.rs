// src/engine.rs
// Top-level engine: database registry, command dispatch and the access
// control boundary. This is the surface the shell/GUI collaborators drive;
// it holds the current database/collection the way the original front-end
// tracked its selection.

use crate::backup::BackupManager;
use crate::database::Database;
use crate::document::Document;
use crate::error::{A2zError, Result};
use crate::parser::{parse, Command};
use crate::permissions::PermissionManager;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// What a dispatched command returns to the caller
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Acknowledgement message (DDL, transactions, backup/restore)
    Ok(String),
    InsertedId(String),
    InsertedIds(Vec<String>),
    Documents(Vec<Document>),
    Values(Vec<Value>),
    Updated(usize),
    Deleted(usize),
    Indexes(Vec<Value>),
    TransactionStarted(String),
}

pub struct Engine {
    root: PathBuf,
    databases: RwLock<HashMap<String, Arc<Database>>>,
    current_db: RwLock<Option<String>>,
    current_collection: RwLock<Option<String>>,
    backups: BackupManager,
    permissions: PermissionManager,
}

impl Engine {
    /// Engine over a database root directory; backups live in a sibling
    /// `backups/` directory.
    pub fn new(root: PathBuf) -> Result<Engine> {
        std::fs::create_dir_all(&root)?;
        let backup_dir = root
            .parent()
            .map(|parent| parent.join("backups"))
            .unwrap_or_else(|| PathBuf::from("backups"));
        Ok(Engine {
            root,
            databases: RwLock::new(HashMap::new()),
            current_db: RwLock::new(None),
            current_collection: RwLock::new(None),
            backups: BackupManager::new(backup_dir)?,
            permissions: PermissionManager::new(),
        })
    }

    pub fn permissions(&self) -> &PermissionManager {
        &self.permissions
    }

    pub fn current_database(&self) -> Option<String> {
        self.current_db.read().clone()
    }

    /// Parse and execute one surface-language command
    pub fn execute_query(&self, input: &str) -> Result<Response> {
        let command = parse(input)?;
        self.execute(command)
    }

    /// Execute with the access predicate consulted first; unauthorized
    /// invocations are denied before dispatch.
    pub fn execute_as(&self, roles: &[String], command: Command) -> Result<Response> {
        let required = command.required_permission();
        if !self.permissions.check_permission(roles, required) {
            return Err(A2zError::PermissionDenied {
                permission: required.as_str().to_string(),
            });
        }
        self.execute(command)
    }

    /// Dispatch a parsed command
    pub fn execute(&self, command: Command) -> Result<Response> {
        match command {
            Command::BeginTransaction => {
                let id = self.current()?.begin_transaction()?;
                Ok(Response::TransactionStarted(id))
            }
            Command::Commit => {
                self.current()?.commit()?;
                Ok(Response::Ok("Transaction committed".to_string()))
            }
            Command::Rollback => {
                self.current()?.rollback()?;
                Ok(Response::Ok("Transaction rolled back".to_string()))
            }

            Command::CreateDb { name } => {
                self.open_database(&name)?;
                Ok(Response::Ok(format!("Database '{name}' created")))
            }
            Command::DropDb { name } => {
                let db = self.open_database(&name)?;
                db.drop_database()?;
                self.databases.write().remove(&name);
                let mut current = self.current_db.write();
                if current.as_deref() == Some(name.as_str()) {
                    *current = None;
                    *self.current_collection.write() = None;
                }
                Ok(Response::Ok(format!("Database '{name}' deleted")))
            }
            Command::UseDb { name } => {
                self.open_database(&name)?;
                *self.current_db.write() = Some(name.clone());
                *self.current_collection.write() = None;
                Ok(Response::Ok(format!("Using database '{name}'")))
            }

            Command::CreateCollection { name } => {
                self.current()?.create_collection(&name, None)?;
                Ok(Response::Ok(format!("Collection '{name}' created")))
            }
            Command::DropCollection { name } => {
                self.current()?.drop_collection(&name)?;
                let mut selected = self.current_collection.write();
                if selected.as_deref() == Some(name.as_str()) {
                    *selected = None;
                }
                Ok(Response::Ok(format!("Collection '{name}' deleted")))
            }

            Command::CreateIndex { field, collection } => {
                self.current()?.create_index(&collection, &field)?;
                Ok(Response::Ok(format!(
                    "Index created on field '{field}' in collection '{collection}'"
                )))
            }
            Command::ListIndexes { collection } => {
                Ok(Response::Indexes(self.current()?.list_indexes(&collection)?))
            }
            Command::EnableIndexing { enable } => {
                let selected = self.current_collection.read().clone().ok_or_else(|| {
                    A2zError::Validation("No collection selected".to_string())
                })?;
                self.current()?.enable_indexing(&selected, enable)?;
                let status = if enable { "enabled" } else { "disabled" };
                Ok(Response::Ok(format!("Indexing {status}")))
            }

            Command::Insert { collection, document } => {
                let id = self
                    .current()?
                    .insert_one(&collection, Value::Object(document))?;
                Ok(Response::InsertedId(id))
            }
            Command::InsertMany { collection, documents } => {
                let ids = self.current()?.insert_many(
                    &collection,
                    documents.into_iter().map(Value::Object).collect(),
                )?;
                Ok(Response::InsertedIds(ids))
            }
            Command::Update { collection, query, update } => {
                let count = self.current()?.update_many(&collection, &query, &update)?;
                Ok(Response::Updated(count))
            }
            Command::Delete { collection, query } => {
                let count = self.current()?.delete_many(&collection, &query)?;
                Ok(Response::Deleted(count))
            }

            Command::Find { collection, query } => {
                let db = self.current()?;
                let query = if query.is_empty() { None } else { Some(&query) };
                let documents = db.find(&collection, query)?;
                // find selects the collection index toggles apply to
                *self.current_collection.write() = Some(collection);
                Ok(Response::Documents(documents))
            }
            Command::Aggregate { collection, pipeline } => {
                Ok(Response::Values(self.current()?.aggregate(&collection, &pipeline)?))
            }

            Command::Backup { name } => {
                let path = self.backups.create_backup(&self.root, &name)?;
                Ok(Response::Ok(format!("Backup created at: {}", path.display())))
            }
            Command::Restore { name } => {
                let message = self.backups.restore_backup(&self.root, &name, None)?;
                // Drop the cached handle so the restored files are reloaded
                self.databases.write().remove(&name);
                Ok(Response::Ok(message))
            }
        }
    }

    /// The selected database, or a validation error matching the original
    /// front-end's guidance
    fn current(&self) -> Result<Arc<Database>> {
        let name = self.current_db.read().clone().ok_or_else(|| {
            A2zError::Validation(
                "No database selected. Use: database chalao <name>".to_string(),
            )
        })?;
        self.open_database(&name)
    }

    /// Open (creating on first reference) and cache a database handle
    fn open_database(&self, name: &str) -> Result<Arc<Database>> {
        if let Some(db) = self.databases.read().get(name) {
            return Ok(db.clone());
        }
        let db = Arc::new(Database::open(name, &self.root)?);
        self.databases.write().insert(name.to_string(), db.clone());
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Engine {
        Engine::new(dir.path().join("db")).unwrap()
    }

    #[test]
    fn test_operations_require_selected_database() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir);
        assert!(matches!(
            eng.execute_query("nava collection banao items"),
            Err(A2zError::Validation(_))
        ));
    }

    #[test]
    fn test_end_to_end_crud() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir);

        eng.execute_query("nava database banao store").unwrap();
        eng.execute_query("database chalao store").unwrap();
        eng.execute_query("nava collection banao items").unwrap();

        let response = eng
            .execute_query(r#"dakhil karo items {"_id":"a","price":10}"#)
            .unwrap();
        assert_eq!(response, Response::InsertedId("a".to_string()));

        let response = eng
            .execute_query(r#"badlo items {"_id":"a"} {"$set":{"price":15}}"#)
            .unwrap();
        assert_eq!(response, Response::Updated(1));

        match eng.execute_query(r#"labbo items {"price":{"$gt":10}}"#).unwrap() {
            Response::Documents(docs) => {
                assert_eq!(docs.len(), 1);
                assert_eq!(docs[0].get("price"), Some(&json!(15)));
            }
            other => panic!("expected documents, got {other:?}"),
        }

        let response = eng.execute_query(r#"mitao items {"_id":"a"}"#).unwrap();
        assert_eq!(response, Response::Deleted(1));
    }

    #[test]
    fn test_enable_indexing_targets_current_collection() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir);
        eng.execute_query("nava database banao store").unwrap();
        eng.execute_query("database chalao store").unwrap();
        eng.execute_query("nava collection banao items").unwrap();

        // No find yet, so no collection is selected
        assert!(matches!(
            eng.execute_query("index chalo karo"),
            Err(A2zError::Validation(_))
        ));

        eng.execute_query("labbo items").unwrap();
        assert_eq!(
            eng.execute_query("index chalo karo").unwrap(),
            Response::Ok("Indexing enabled".to_string())
        );
    }

    #[test]
    fn test_permission_denied_before_dispatch() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir);
        let reader = vec!["read".to_string()];
        let admin = vec!["admin".to_string()];

        let command = parse("nava database banao store").unwrap();
        assert!(matches!(
            eng.execute_as(&reader, command.clone()),
            Err(A2zError::PermissionDenied { .. })
        ));
        // Denial happened before dispatch: nothing was created
        assert!(!dir.path().join("db").join("store").exists());

        eng.execute_as(&admin, command).unwrap();
        assert!(dir.path().join("db").join("store").exists());
    }

    #[test]
    fn test_backup_and_restore_via_engine() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir);
        eng.execute_query("nava database banao store").unwrap();
        eng.execute_query("database chalao store").unwrap();
        eng.execute_query("nava collection banao items").unwrap();
        eng.execute_query(r#"dakhil karo items {"_id":"a","n":1}"#).unwrap();

        eng.execute_query("backup banao store").unwrap();
        eng.execute_query(r#"mitao items {"_id":"a"}"#).unwrap();

        eng.execute_query("restore karo store").unwrap();
        match eng.execute_query("labbo items").unwrap() {
            Response::Documents(docs) => {
                assert_eq!(docs.len(), 1);
                assert_eq!(docs[0].id(), "a");
            }
            other => panic!("expected documents, got {other:?}"),
        }
    }

    #[test]
    fn test_drop_db_clears_selection() {
        let dir = TempDir::new().unwrap();
        let eng = engine(&dir);
        eng.execute_query("nava database banao store").unwrap();
        eng.execute_query("database chalao store").unwrap();
        eng.execute_query("database nu mitao store").unwrap();
        assert_eq!(eng.current_database(), None);
        assert!(!dir.path().join("db").join("store").exists());
    }
}
