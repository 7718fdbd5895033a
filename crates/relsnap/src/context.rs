//! Run-scoped snapshot state
//!
//! One [`SnapshotContext`] exists per `execute` call, owned by the engine and
//! passed by reference into capability and exporter calls. It never survives a
//! run and is never shared across runs.

use crate::error::{Result, SnapshotError};
use crate::table::{TableId, Tables};

/// Mutable context populated in the course of a snapshot run.
#[derive(Debug)]
pub struct SnapshotContext<O> {
    /// Name of the catalog this run is scoped to
    pub catalog_name: String,
    /// Structural metadata read for captured tables
    pub tables: Tables,
    /// Captured tables in export order; computed once, before locking
    pub captured_tables: Vec<TableId>,
    /// Snapshot offset, set by `determine_offset`
    pub offset: Option<O>,
    /// Whether the table currently being exported is the last one
    pub last_table: bool,
    /// Whether the row about to be dispatched is its table's last row
    pub last_record_in_table: bool,
}

impl<O> SnapshotContext<O> {
    /// Create a fresh context scoped to one catalog.
    pub fn new(catalog_name: impl Into<String>) -> Self {
        Self {
            catalog_name: catalog_name.into(),
            tables: Tables::new(),
            captured_tables: Vec::new(),
            offset: None,
            last_table: false,
            last_record_in_table: false,
        }
    }

    /// Mutable access to the offset; errors if `determine_offset` never set it.
    pub fn offset_mut(&mut self) -> Result<&mut O> {
        self.offset
            .as_mut()
            .ok_or_else(|| SnapshotError::runtime("snapshot offset not initialized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context() {
        let ctx: SnapshotContext<u64> = SnapshotContext::new("inventory");
        assert_eq!(ctx.catalog_name, "inventory");
        assert!(ctx.captured_tables.is_empty());
        assert!(ctx.tables.is_empty());
        assert!(ctx.offset.is_none());
        assert!(!ctx.last_table);
        assert!(!ctx.last_record_in_table);
    }
}
