// src/transaction.rs
// Operation records, the active-transaction handle and its journal file

use crate::document::Document;
use crate::error::{A2zError, Result};
use crate::logging::log_operation;
use crate::update::UpdateSpec;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Transaction identifier: UUID v4 textual form
pub type TransactionId = String;

/// One journaled mutation. Serialized one-per-line into `<tx>.log`:
/// `type`, `collection`, `timestamp` (epoch seconds) plus the type-specific
/// payload; update records carry the mutation under its operator key
/// (`set` / `unset` / `push`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationRecord {
    Insert {
        collection: String,
        document: Document,
        timestamp: i64,
    },
    Update {
        collection: String,
        doc_id: String,
        original_doc: Document,
        #[serde(flatten)]
        mutation: UpdateSpec,
        timestamp: i64,
    },
    Delete {
        collection: String,
        doc_id: String,
        document: Document,
        timestamp: i64,
    },
    CreateCollection {
        collection: String,
        indexes: Option<Vec<String>>,
        timestamp: i64,
    },
    DropCollection {
        collection: String,
        documents: Vec<Document>,
        timestamp: i64,
    },
}

impl OperationRecord {
    /// The collection this record targets
    pub fn collection(&self) -> &str {
        match self {
            OperationRecord::Insert { collection, .. }
            | OperationRecord::Update { collection, .. }
            | OperationRecord::Delete { collection, .. }
            | OperationRecord::CreateCollection { collection, .. }
            | OperationRecord::DropCollection { collection, .. } => collection,
        }
    }

    pub fn timestamp_now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// The coordinator's handle for the single active transaction of a database:
/// owns the append-only operation list and the journal file. Collections
/// never hold a reference back; they receive this handle at the point of
/// each transactional call and append through [`record`](Self::record).
#[derive(Debug)]
pub struct ActiveTransaction {
    id: TransactionId,
    operations: Vec<OperationRecord>,
    journal_path: PathBuf,
}

impl ActiveTransaction {
    /// Begin a transaction: mint the id and create its (empty) journal file
    pub fn begin(log_dir: &Path) -> Result<ActiveTransaction> {
        let id = Uuid::new_v4().to_string();
        let journal_path = log_dir.join(format!("{id}.log"));
        std::fs::File::create(&journal_path)?;
        Ok(ActiveTransaction {
            id,
            operations: Vec::new(),
            journal_path,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operations(&self) -> &[OperationRecord] {
        &self.operations
    }

    /// Append a record to the in-memory list and the journal file.
    ///
    /// The journal handle is opened append-only per record and flushed
    /// before returning, so every buffered operation is on disk before the
    /// mutation call completes.
    pub fn record(&mut self, op: OperationRecord) -> Result<()> {
        let line = serde_json::to_string(&op)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .map_err(|e| {
                log_operation(
                    "TX_LOG_WRITE",
                    &format!("transaction:{}", self.id),
                    "FAILED",
                    &e.to_string(),
                );
                A2zError::Io(e)
            })?;
        writeln!(file, "{line}")?;
        file.flush()?;
        self.operations.push(op);
        Ok(())
    }

    /// Hand the operation list to the coordinator for replay. The journal
    /// stays on disk until the coordinator removes it after the terminal
    /// transition, success or not.
    pub fn into_parts(self) -> (TransactionId, Vec<OperationRecord>, PathBuf) {
        (self.id, self.operations, self.journal_path)
    }
}

/// Remove a journal file, tolerating its absence
pub fn remove_journal(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(A2zError::Io(e)),
    }
}
