//! Table inclusion filtering
//!
//! Compiled include/exclude filter applied to candidate tables when the
//! captured-table set is determined. Exclude wins over include; an empty
//! include list captures everything not excluded.

use crate::config::SnapshotConfig;
use crate::pattern::{PatternError, PatternSet};
use crate::table::TableId;

/// Compiled table filter.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: PatternSet,
    exclude: PatternSet,
}

impl TableFilter {
    /// Compile the filter from configuration patterns.
    pub fn from_config(config: &SnapshotConfig) -> Result<Self, PatternError> {
        Ok(Self {
            include: PatternSet::from_patterns(&config.include_tables)?,
            exclude: PatternSet::from_patterns(&config.exclude_tables)?,
        })
    }

    /// Check whether a table should be captured.
    pub fn is_included(&self, id: &TableId) -> bool {
        let qualified = id.qualified_name();

        if self.exclude.matches_qualified(&qualified, &id.table) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.matches_qualified(&qualified, &id.table)
    }
}
