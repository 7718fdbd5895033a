//! Snapshot configuration
//!
//! Everything the host supplies to shape one run: pre-snapshot delay, cursor
//! fetch size, table include/exclude patterns, ordering patterns, per-table
//! SELECT overrides, and the scan-progress logging cadence.

use crate::table::TableId;
use std::collections::HashMap;
use std::time::Duration;

/// Default number of rows fetched per cursor round-trip.
pub const DEFAULT_FETCH_SIZE: u32 = 2_000;

/// Default interval between scan-progress log lines for one table.
pub const DEFAULT_SCAN_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for a snapshot run.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Delay before the run does any real work; `None` means no delay
    pub snapshot_delay: Option<Duration>,
    /// Rows per cursor fetch
    pub fetch_size: u32,
    /// Glob patterns selecting tables to capture; empty means all tables
    pub include_tables: Vec<String>,
    /// Glob patterns excluding tables even when included above
    pub exclude_tables: Vec<String>,
    /// Ordered patterns grouping captured tables into export order;
    /// empty means plain identifier order
    pub table_order: Vec<String>,
    /// Per-table SELECT overrides keyed by fully- or partially-qualified name
    pub select_overrides: HashMap<String, String>,
    /// Cadence for per-table progress logs and `rows_scanned` callbacks
    pub scan_log_interval: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            snapshot_delay: None,
            fetch_size: DEFAULT_FETCH_SIZE,
            include_tables: Vec::new(),
            exclude_tables: Vec::new(),
            table_order: Vec::new(),
            select_overrides: HashMap::new(),
            scan_log_interval: DEFAULT_SCAN_LOG_INTERVAL,
        }
    }
}

impl SnapshotConfig {
    pub fn builder() -> SnapshotConfigBuilder {
        SnapshotConfigBuilder::default()
    }

    /// Resolve a SELECT override for a table.
    ///
    /// Tries the fully qualified name first, then the catalog-less name, since
    /// override keys may or may not carry a catalog depending on the connector.
    pub fn select_override_for(&self, id: &TableId) -> Option<&str> {
        if let Some(select) = self.select_overrides.get(&id.qualified_name()) {
            return Some(select.as_str());
        }
        self.select_overrides
            .get(&id.without_catalog().qualified_name())
            .map(|s| s.as_str())
    }
}

/// Builder for [`SnapshotConfig`].
#[derive(Default)]
pub struct SnapshotConfigBuilder {
    config: SnapshotConfig,
}

impl SnapshotConfigBuilder {
    /// Set the pre-snapshot delay.
    pub fn snapshot_delay(mut self, delay: Duration) -> Self {
        self.config.snapshot_delay = Some(delay);
        self
    }

    /// Set the cursor fetch size (minimum 1).
    pub fn fetch_size(mut self, size: u32) -> Self {
        self.config.fetch_size = size.max(1);
        self
    }

    /// Add an include pattern.
    pub fn include_table(mut self, pattern: impl Into<String>) -> Self {
        self.config.include_tables.push(pattern.into());
        self
    }

    /// Add an exclude pattern.
    pub fn exclude_table(mut self, pattern: impl Into<String>) -> Self {
        self.config.exclude_tables.push(pattern.into());
        self
    }

    /// Set the ordered table-ordering patterns.
    pub fn table_order(mut self, patterns: Vec<String>) -> Self {
        self.config.table_order = patterns;
        self
    }

    /// Add a per-table SELECT override.
    pub fn select_override(
        mut self,
        table: impl Into<String>,
        select: impl Into<String>,
    ) -> Self {
        self.config
            .select_overrides
            .insert(table.into(), select.into());
        self
    }

    /// Set the scan-progress logging cadence.
    pub fn scan_log_interval(mut self, interval: Duration) -> Self {
        self.config.scan_log_interval = interval;
        self
    }

    pub fn build(self) -> SnapshotConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SnapshotConfig::default();
        assert_eq!(config.fetch_size, DEFAULT_FETCH_SIZE);
        assert_eq!(config.scan_log_interval, DEFAULT_SCAN_LOG_INTERVAL);
        assert!(config.snapshot_delay.is_none());
        assert!(config.include_tables.is_empty());
    }

    #[test]
    fn test_builder() {
        let config = SnapshotConfig::builder()
            .snapshot_delay(Duration::from_secs(5))
            .fetch_size(0)
            .include_table("public.*")
            .exclude_table("public.tmp_*")
            .table_order(vec!["public.a*".to_string(), "public.b*".to_string()])
            .select_override("public.users", "SELECT id, name FROM public.users")
            .scan_log_interval(Duration::from_secs(1))
            .build();

        assert_eq!(config.snapshot_delay, Some(Duration::from_secs(5)));
        assert_eq!(config.fetch_size, 1);
        assert_eq!(config.include_tables, vec!["public.*"]);
        assert_eq!(config.exclude_tables, vec!["public.tmp_*"]);
        assert_eq!(config.table_order.len(), 2);
        assert_eq!(config.scan_log_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_select_override_resolution() {
        let config = SnapshotConfig::builder()
            .select_override("crm.public.users", "SELECT * FROM users WHERE active")
            .select_override("public.orders", "SELECT * FROM orders")
            .build();

        let users = TableId::new("crm", "public", "users");
        let orders = TableId::new("crm", "public", "orders");
        let missing = TableId::new("crm", "public", "products");

        // Full-qualified key wins
        assert_eq!(
            config.select_override_for(&users),
            Some("SELECT * FROM users WHERE active")
        );
        // Falls back to the catalog-less key
        assert_eq!(config.select_override_for(&orders), Some("SELECT * FROM orders"));
        assert_eq!(config.select_override_for(&missing), None);
    }
}
