//! Error types for snapshot runs
//!
//! The taxonomy separates cancellation (operator-initiated, not a defect) from
//! initialization failures, table-scoped scan failures, and everything else.
//! No variant is retried inside the engine; retry is an outer-layer policy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error categories for metrics and alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Cooperative cancellation requested by the host
    Cancellation,
    /// Failure while preparing the run (before any table work)
    Initialization,
    /// Failure while scanning a single table (read or value coercion)
    TableScan,
    /// Configuration errors (invalid patterns, bad settings)
    Configuration,
    /// Database errors surfaced by the capability layer
    Database,
    /// Other/unknown errors
    Other,
}

/// Snapshot-specific errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The run was stopped through the cancellation token.
    ///
    /// Not a defect: the host asked the engine to stop. Distinct from every
    /// other variant so callers can tell an operator stop from a failure.
    #[error("snapshot cancelled: {0}")]
    Cancelled(String),

    /// Error while preparing the snapshot run, before any table work.
    #[error("failed to initialize snapshot: {0}")]
    Initialization(String),

    /// Fatal, table-identified scan failure. Never retried by the engine.
    #[error("snapshotting of table '{table}' failed: {message}")]
    TableScan {
        /// Qualified name of the table whose scan failed
        table: String,
        /// Underlying failure description
        message: String,
    },

    /// Configuration error (invalid pattern, bad override key, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Database error from the capability layer
    #[error("database error: {0}")]
    Database(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other runtime error
    #[error("snapshot error: {0}")]
    Runtime(String),
}

impl SnapshotError {
    /// Create a cancellation error.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an initialization error.
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Create a table-scoped scan error.
    pub fn table_scan(table: impl std::fmt::Display, msg: impl Into<String>) -> Self {
        Self::TableScan {
            table: table.to_string(),
            message: msg.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a generic runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Check whether this error represents cooperative cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Get the error category for metrics/alerting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Cancelled(_) => ErrorCategory::Cancellation,
            Self::Initialization(_) => ErrorCategory::Initialization,
            Self::TableScan { .. } => ErrorCategory::TableScan,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Database(_) => ErrorCategory::Database,
            Self::Json(_) | Self::Runtime(_) => ErrorCategory::Other,
        }
    }
}

impl From<crate::pattern::PatternError> for SnapshotError {
    fn from(e: crate::pattern::PatternError) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, SnapshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_is_distinct() {
        let cancelled = SnapshotError::cancelled("stop requested");
        let scan = SnapshotError::table_scan("public.users", "boom");

        assert!(cancelled.is_cancellation());
        assert!(!scan.is_cancellation());
        assert_eq!(cancelled.category(), ErrorCategory::Cancellation);
        assert_eq!(scan.category(), ErrorCategory::TableScan);
    }

    #[test]
    fn test_table_scan_names_table() {
        let err = SnapshotError::table_scan("inventory.orders", "coercion failed");
        let msg = err.to_string();
        assert!(msg.contains("inventory.orders"));
        assert!(msg.contains("coercion failed"));
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            SnapshotError::initialization("no catalog").category(),
            ErrorCategory::Initialization
        );
        assert_eq!(
            SnapshotError::config("bad pattern").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            SnapshotError::database("connection reset").category(),
            ErrorCategory::Database
        );
        assert_eq!(
            SnapshotError::runtime("unexpected").category(),
            ErrorCategory::Other
        );
    }
}
