// a2zdb-core/src/lib.rs
// Embedded document database: named databases of JSON document collections
// with hash indexes, an aggregation pipeline, journaled single-active
// transactions and a keyword query language.

#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]
// Tests may have helper functions not used in all test cases
#![cfg_attr(test, allow(dead_code))]

pub mod aggregation;
pub mod auth;
pub mod backup;
pub mod collection;
pub mod database;
pub mod document;
pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod parser;
pub mod permissions;
pub mod query;
pub mod transaction;
pub mod update;
pub mod value_utils;

// Public exports
pub use aggregation::Pipeline;
pub use auth::{AuthManager, User};
pub use backup::{BackupInfo, BackupManager};
pub use collection::Collection;
pub use database::{validate_name, Database};
pub use document::Document;
pub use engine::{Engine, Response};
pub use error::{A2zError, Result};
pub use index::{IndexKey, IndexManager};
pub use logging::{get_log_level, log_operation, set_log_level, set_log_sink, LogLevel, LogSink, OperationEvent};
pub use parser::{parse, Command};
pub use permissions::{Permission, PermissionManager, Role};
pub use query::{matches, QueryOperator};
pub use transaction::{ActiveTransaction, OperationRecord, TransactionId};
pub use update::UpdateSpec;
