//! Snapshot progress notifications
//!
//! Lifecycle and row-count callbacks for monitoring a snapshot run.
//! `snapshot_completed` and `snapshot_aborted` are mutually exclusive and each
//! fires at most once per run.

use crate::table::TableId;

/// Listener for snapshot lifecycle and progress.
///
/// All methods default to no-ops so implementors only override what they
/// observe.
pub trait SnapshotProgressListener: Send + Sync {
    /// The run passed classification and is starting real work.
    fn snapshot_started(&self) {}

    /// The captured-table set was determined, in export order.
    fn monitored_tables_determined(&self, _tables: &[TableId]) {}

    /// Cumulative rows scanned for a table, reported on the logging cadence.
    fn rows_scanned(&self, _table: &TableId, _rows: u64) {}

    /// A table finished exporting with the given total row count.
    fn table_snapshot_completed(&self, _table: &TableId, _rows: u64) {}

    /// The whole run completed successfully.
    fn snapshot_completed(&self) {}

    /// The run was aborted by a failure or cancellation.
    fn snapshot_aborted(&self) {}
}

/// Listener that ignores every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgressListener;

impl SnapshotProgressListener for NullProgressListener {}
