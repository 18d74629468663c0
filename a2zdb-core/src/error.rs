// src/error.rs
// Crate-wide error type

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, A2zError>;

/// All error kinds the engine can surface
#[derive(Debug, Error)]
pub enum A2zError {
    /// Malformed input: bad names, bad documents, bad update syntax
    #[error("validation error: {0}")]
    Validation(String),

    /// Surface-language or JSON parse failure with position info
    #[error("parse error: {message} at position {offset}, line {line}, column {column}")]
    Parse {
        message: String,
        offset: usize,
        line: usize,
        column: usize,
    },

    #[error("database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("document '{0}' not found")]
    DocumentNotFound(String),

    #[error("no backup found for '{0}'")]
    BackupNotFound(String),

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("index already exists on field: {0}")]
    IndexExists(String),

    #[error("user '{0}' already exists")]
    UserExists(String),

    /// Transactional misuse (begin while active, commit/rollback while idle)
    #[error("transaction protocol error: {0}")]
    Protocol(String),

    /// Apply/undo failure during commit or rollback
    #[error("fatal transaction error: {0}")]
    FatalTransaction(String),

    #[error("malformed aggregation pipeline: {0}")]
    Aggregation(String),

    #[error("permission denied: operation requires {permission}")]
    PermissionDenied { permission: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl A2zError {
    /// Build a positioned parse error from a serde_json failure.
    ///
    /// serde_json reports line/column only; the byte offset is recovered by
    /// walking the input, matching what callers of the surface language see.
    pub fn from_json_error(err: &serde_json::Error, input: &str) -> Self {
        let line = err.line();
        let column = err.column();
        let offset = input
            .lines()
            .take(line.saturating_sub(1))
            .map(|l| l.len() + 1)
            .sum::<usize>()
            + column.saturating_sub(1);
        A2zError::Parse {
            message: err.to_string(),
            offset,
            line,
            column,
        }
    }
}
