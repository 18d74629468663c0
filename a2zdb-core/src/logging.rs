// logging.rs - Embedded-friendly logging with a pluggable operation sink
// No external logging framework; the sink is the collaborator boundary.

use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Log levels (ordered by severity)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Errors - critical failures that prevent operations
    Error = 0,
    /// Warnings - potential issues that don't stop execution
    Warn = 1,
    /// Info - high-level operational information
    Info = 2,
    /// Debug - detailed diagnostic information
    Debug = 3,
}

impl LogLevel {
    /// Parse log level from string (case-insensitive)
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_uppercase().as_str() {
            "ERROR" => Some(LogLevel::Error),
            "WARN" => Some(LogLevel::Warn),
            "INFO" => Some(LogLevel::Info),
            "DEBUG" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

// Global log level (default: WARN for production)
static GLOBAL_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);

/// Set the global log level
pub fn set_log_level(level: LogLevel) {
    GLOBAL_LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Get the current global log level
pub fn get_log_level() -> LogLevel {
    match GLOBAL_LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Error,
        1 => LogLevel::Warn,
        2 => LogLevel::Info,
        3 => LogLevel::Debug,
        _ => LogLevel::Warn,
    }
}

/// Check if a message at the given level should be logged
#[inline]
pub fn should_log(level: LogLevel) -> bool {
    level <= get_log_level()
}

/// One structured event per engine operation:
/// what ran, against which target, how it ended, and any detail text.
#[derive(Debug, Clone)]
pub struct OperationEvent {
    pub category: String,
    pub target: String,
    pub status: String,
    pub details: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Sink for operation events. The engine only emits; whatever is installed
/// here decides where events go (stderr by default, a file, a test buffer).
pub trait LogSink: Send + Sync {
    fn emit(&self, event: &OperationEvent);
}

/// Default sink: single-line events on stderr, original log format
struct StderrSink;

impl LogSink for StderrSink {
    fn emit(&self, event: &OperationEvent) {
        if !should_log(LogLevel::Info) {
            return;
        }
        let mut message = format!(
            "{} - {} - {}",
            event.category.to_uppercase(),
            event.target,
            event.status
        );
        if !event.details.is_empty() {
            message.push_str(&format!(" - {}", event.details));
        }
        eprintln!(
            "{} - INFO - {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            message
        );
    }
}

lazy_static! {
    static ref OPERATION_SINK: RwLock<Arc<dyn LogSink>> = RwLock::new(Arc::new(StderrSink));
}

/// Install a custom sink for operation events
pub fn set_log_sink(sink: Arc<dyn LogSink>) {
    *OPERATION_SINK.write() = sink;
}

/// Emit a structured operation event to the installed sink
pub fn log_operation(category: &str, target: &str, status: &str, details: &str) {
    let event = OperationEvent {
        category: category.to_string(),
        target: target.to_string(),
        status: status.to_string(),
        details: details.to_string(),
        timestamp: chrono::Utc::now(),
    };
    OPERATION_SINK.read().emit(&event);
}

/// Internal logging function for the level macros
#[doc(hidden)]
pub fn log_message(level: LogLevel, module: &str, message: &str) {
    if should_log(level) {
        eprintln!("[{}] {}: {}", level.as_str(), module, message);
    }
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Error,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Warn,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Info,
            module_path!(),
            &format!($($arg)*)
        )
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_message(
            $crate::logging::LogLevel::Debug,
            module_path!(),
            &format!($($arg)*)
        )
    };
}
