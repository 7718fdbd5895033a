//! Snapshot position tracking
//!
//! The offset is an opaque, engine-specific marker of replication progress
//! (WAL LSN, binlog position, SCN, ...). The engine never inspects it; it only
//! drives the fixed phase transitions below. `mark_last_snapshot_record` must
//! be invoked exactly once per run, on the globally last exported row — or,
//! when the last captured table is empty, with no row at all.

use crate::table::TableId;
use chrono::{DateTime, Utc};

/// Phase transitions the engine drives on an engine-specific offset.
pub trait SnapshotOffset: Send {
    /// Whether this offset records a snapshot that was still running when it
    /// was stored (a previous run was cancelled before completion).
    fn is_snapshot_running(&self) -> bool;

    /// Entering the data-export phase.
    fn mark_snapshot_running(&mut self);

    /// A row for `table` was read at `ts` and is about to be dispatched.
    fn record_event(&mut self, table: &TableId, ts: DateTime<Utc>);

    /// The row about to be dispatched is the last record of the snapshot.
    fn mark_last_snapshot_record(&mut self);

    /// All rows exported; the snapshot is about to complete.
    fn pre_snapshot_completion(&mut self);

    /// The snapshot completed; streaming may begin from this offset.
    fn post_snapshot_completion(&mut self);
}
