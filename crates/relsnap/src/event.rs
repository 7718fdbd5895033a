//! Change-event representation
//!
//! Snapshot rows are emitted as the same kind of change event used for
//! streaming replication, so downstream consumers bootstrap state from one
//! uniform stream. During a snapshot only [`ChangeOp::SnapshotRead`] events are
//! produced; the other operations exist for the streaming phase that follows.

use crate::table::TableId;
use serde::{Deserialize, Serialize};

/// A row as read from the database: one value per column, in the table's
/// column order. Transient; produced and consumed within one export iteration.
pub type Row = Vec<serde_json::Value>;

/// Change operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOp {
    /// Row inserted
    Insert,
    /// Row updated
    Update,
    /// Row deleted
    Delete,
    /// Table truncated
    Truncate,
    /// Row read during the initial snapshot
    SnapshotRead,
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeOp::Insert => write!(f, "INSERT"),
            ChangeOp::Update => write!(f, "UPDATE"),
            ChangeOp::Delete => write!(f, "DELETE"),
            ChangeOp::Truncate => write!(f, "TRUNCATE"),
            ChangeOp::SnapshotRead => write!(f, "SNAPSHOT"),
        }
    }
}

/// A change captured from a database table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Table the change belongs to
    pub table: TableId,
    /// Operation type
    pub op: ChangeOp,
    /// Previous row state (UPDATE/DELETE)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Row>,
    /// Current row state (INSERT/UPDATE/SNAPSHOT)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Row>,
    /// Event timestamp (Unix epoch millis)
    pub timestamp: i64,
}

impl ChangeEvent {
    /// Create a snapshot-read event for a row.
    pub fn snapshot_read(table: TableId, row: Row, timestamp: i64) -> Self {
        Self {
            table,
            op: ChangeOp::SnapshotRead,
            before: None,
            after: Some(row),
            timestamp,
        }
    }

    /// Check if this event carries row data.
    pub fn has_data(&self) -> bool {
        self.before.is_some() || self.after.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_read_event() {
        let event = ChangeEvent::snapshot_read(
            TableId::new("db", "public", "users"),
            vec![json!(1), json!("Alice")],
            1_705_000_000_000,
        );

        assert_eq!(event.op, ChangeOp::SnapshotRead);
        assert!(event.before.is_none());
        assert_eq!(event.after.as_ref().map(|r| r.len()), Some(2));
        assert!(event.has_data());
    }

    #[test]
    fn test_serialization_omits_empty_states() {
        let event = ChangeEvent::snapshot_read(
            TableId::without_catalog_parts("public", "users"),
            vec![json!(42)],
            0,
        );

        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains("after"));
        assert!(!text.contains("before"));

        let parsed: ChangeEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.op, ChangeOp::SnapshotRead);
    }

    #[test]
    fn test_op_display() {
        assert_eq!(ChangeOp::SnapshotRead.to_string(), "SNAPSHOT");
        assert_eq!(ChangeOp::Insert.to_string(), "INSERT");
    }
}
