//! In-memory capability implementation
//!
//! [`MockSnapshotSource`] serves tables from memory with configurable failure
//! points, and [`MemoryOffset`] counts the phase transitions driven on it.
//! Used throughout the crate's tests and handy for embedding the engine in
//! integration tests of downstream connectors.

use crate::cancellation::CancellationToken;
use crate::context::SnapshotContext;
use crate::error::{Result, SnapshotError};
use crate::event::Row;
use crate::offset::SnapshotOffset;
use crate::schema::SchemaChangeEvent;
use crate::source::{RelationalSnapshotSource, RowCursor, SnapshottingTask};
use crate::table::{Column, TableDefinition, TableId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Offset that counts every phase transition driven on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryOffset {
    /// Whether the snapshot is currently marked running
    pub snapshot_running: bool,
    /// Number of `mark_snapshot_running` calls
    pub marked_running: u32,
    /// Number of `record_event` calls
    pub events: u64,
    /// Number of `mark_last_snapshot_record` calls (must end up at most 1)
    pub last_marked: u32,
    /// Number of `pre_snapshot_completion` calls
    pub pre_completions: u32,
    /// Number of `post_snapshot_completion` calls
    pub post_completions: u32,
    /// Table of the most recent `record_event`
    pub last_event_table: Option<TableId>,
    /// Value of `events` when the boundary was marked
    pub events_at_last_mark: Option<u64>,
}

impl MemoryOffset {
    /// An offset that looks like a previous run stored it mid-snapshot.
    pub fn running() -> Self {
        Self {
            snapshot_running: true,
            ..Self::default()
        }
    }
}

impl SnapshotOffset for MemoryOffset {
    fn is_snapshot_running(&self) -> bool {
        self.snapshot_running
    }

    fn mark_snapshot_running(&mut self) {
        self.snapshot_running = true;
        self.marked_running += 1;
    }

    fn record_event(&mut self, table: &TableId, _ts: DateTime<Utc>) {
        self.events += 1;
        self.last_event_table = Some(table.clone());
    }

    fn mark_last_snapshot_record(&mut self) {
        self.last_marked += 1;
        self.events_at_last_mark = Some(self.events);
    }

    fn pre_snapshot_completion(&mut self) {
        self.pre_completions += 1;
    }

    fn post_snapshot_completion(&mut self) {
        self.snapshot_running = false;
        self.post_completions += 1;
    }
}

/// One table served by [`MockSnapshotSource`].
#[derive(Debug, Clone)]
pub struct MockTable {
    definition: TableDefinition,
    rows: Vec<Row>,
    has_select: bool,
    custom_select: Option<String>,
    fail_after_rows: Option<usize>,
}

impl MockTable {
    /// Create a table with the given structure and rows.
    pub fn new(definition: TableDefinition, rows: Vec<Row>) -> Self {
        Self {
            definition,
            rows,
            has_select: true,
            custom_select: None,
            fail_after_rows: None,
        }
    }

    /// Shorthand for a single-column table of integer rows.
    pub fn numbered(id: TableId, count: usize) -> Self {
        let rows = (0..count)
            .map(|n| vec![serde_json::json!(n as u64)])
            .collect();
        Self::new(
            TableDefinition::new(id, vec![Column::new("id", 1, "bigint")]),
            rows,
        )
    }

    /// Declare that no snapshot SELECT exists for this table, so the engine
    /// skips it during data export.
    pub fn no_select(mut self) -> Self {
        self.has_select = false;
        self
    }

    /// Serve rows for the given SELECT text instead of the default one.
    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.custom_select = Some(select.into());
        self
    }

    /// Make the cursor fail after yielding `rows` rows.
    pub fn fail_after_rows(mut self, rows: usize) -> Self {
        self.fail_after_rows = Some(rows);
        self
    }

    fn select(&self) -> String {
        self.custom_select
            .clone()
            .unwrap_or_else(|| format!("SELECT * FROM {}", self.definition.id))
    }
}

/// Phases where the mock can be told to fail or to cancel the run token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockPhase {
    /// `prepare`
    Prepare,
    /// `begin_transaction`
    Begin,
    /// `lock_tables`
    Lock,
    /// `determine_offset`
    Offset,
    /// `read_table_structure`
    Structure,
    /// `release_locks`
    Release,
}

/// In-memory snapshot source with configurable failure points.
pub struct MockSnapshotSource {
    catalog: String,
    tables: Vec<MockTable>,
    task: SnapshottingTask,
    fail_column: Option<String>,
    fail_in: Option<MockPhase>,
    cancel_in: Option<(MockPhase, CancellationToken)>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl MockSnapshotSource {
    /// Create a source scoped to one catalog, with no tables yet.
    pub fn new(catalog: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            tables: Vec::new(),
            task: SnapshottingTask::new(true, true),
            fail_column: None,
            fail_in: None,
            cancel_in: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Add a table.
    pub fn with_table(mut self, table: MockTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Override the task classification the source reports.
    pub fn with_task(mut self, task: SnapshottingTask) -> Self {
        self.task = task;
        self
    }

    /// Make `column_value` fail for the named column.
    pub fn fail_column(mut self, name: impl Into<String>) -> Self {
        self.fail_column = Some(name.into());
        self
    }

    /// Make the given phase fail with a database error.
    pub fn fail_in(mut self, phase: MockPhase) -> Self {
        self.fail_in = Some(phase);
        self
    }

    /// Cancel `token` when the given phase runs, simulating a host stop
    /// arriving mid-run.
    pub fn cancel_in(mut self, phase: MockPhase, token: CancellationToken) -> Self {
        self.cancel_in = Some((phase, token));
        self
    }

    /// Table definitions served by this source.
    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.iter().map(|t| &t.definition)
    }

    /// Shared handle onto the lifecycle-call log.
    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.calls)
    }

    fn enter(&self, phase: MockPhase, name: &'static str) -> Result<()> {
        self.calls.lock().push(name);
        if let Some((p, token)) = &self.cancel_in {
            if *p == phase {
                token.cancel();
            }
        }
        if self.fail_in == Some(phase) {
            return Err(SnapshotError::database(format!("{} failed", name)));
        }
        Ok(())
    }
}

struct MockCursor {
    rows: VecDeque<Row>,
    fail_after: Option<usize>,
    yielded: usize,
}

#[async_trait]
impl RowCursor for MockCursor {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(limit) = self.fail_after {
            if self.yielded >= limit {
                return Err(SnapshotError::database("cursor read failed"));
            }
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.yielded += 1;
        }
        Ok(row)
    }
}

#[async_trait]
impl RelationalSnapshotSource for MockSnapshotSource {
    type Offset = MemoryOffset;

    fn snapshotting_task(&self, _prior_offset: Option<&Self::Offset>) -> SnapshottingTask {
        self.task
    }

    async fn prepare(&mut self) -> Result<SnapshotContext<Self::Offset>> {
        self.enter(MockPhase::Prepare, "prepare")?;
        Ok(SnapshotContext::new(self.catalog.clone()))
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.enter(MockPhase::Begin, "begin")
    }

    async fn all_table_ids(
        &mut self,
        _ctx: &SnapshotContext<Self::Offset>,
    ) -> Result<Vec<TableId>> {
        Ok(self.tables.iter().map(|t| t.definition.id.clone()).collect())
    }

    async fn lock_tables(
        &mut self,
        _token: &CancellationToken,
        _ctx: &mut SnapshotContext<Self::Offset>,
    ) -> Result<()> {
        self.enter(MockPhase::Lock, "lock")
    }

    async fn determine_offset(&mut self, ctx: &mut SnapshotContext<Self::Offset>) -> Result<()> {
        self.enter(MockPhase::Offset, "offset")?;
        ctx.offset = Some(MemoryOffset::default());
        Ok(())
    }

    async fn read_table_structure(
        &mut self,
        _token: &CancellationToken,
        ctx: &mut SnapshotContext<Self::Offset>,
    ) -> Result<()> {
        self.enter(MockPhase::Structure, "structure")?;
        for table in &self.tables {
            if ctx.captured_tables.contains(&table.definition.id) {
                ctx.tables.overwrite(table.definition.clone());
            }
        }
        Ok(())
    }

    async fn release_locks(&mut self, _ctx: &mut SnapshotContext<Self::Offset>) -> Result<()> {
        self.enter(MockPhase::Release, "release")
    }

    fn create_table_event(
        &self,
        _ctx: &SnapshotContext<Self::Offset>,
        table: &TableDefinition,
    ) -> Result<SchemaChangeEvent> {
        Ok(SchemaChangeEvent::create(
            table.clone(),
            Some(format!("CREATE TABLE {}", table.id)),
        ))
    }

    fn snapshot_select(
        &self,
        _ctx: &SnapshotContext<Self::Offset>,
        id: &TableId,
    ) -> Option<String> {
        self.tables
            .iter()
            .find(|t| &t.definition.id == id)
            .filter(|t| t.has_select)
            .map(|t| t.select())
    }

    async fn execute_snapshot_query(
        &mut self,
        select: &str,
        _fetch_size: u32,
    ) -> Result<Box<dyn RowCursor>> {
        let table = self
            .tables
            .iter()
            .find(|t| t.select() == select)
            .ok_or_else(|| SnapshotError::database(format!("unknown query: {}", select)))?;
        Ok(Box::new(MockCursor {
            rows: table.rows.iter().cloned().collect(),
            fail_after: table.fail_after_rows,
            yielded: 0,
        }))
    }

    fn column_value(&self, raw: serde_json::Value, column: &Column) -> Result<serde_json::Value> {
        if self.fail_column.as_deref() == Some(column.name.as_str()) {
            return Err(SnapshotError::database(format!(
                "cannot convert column '{}'",
                column.name
            )));
        }
        Ok(raw)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.calls.lock().push("rollback");
        Ok(())
    }

    async fn complete(&mut self, _ctx: SnapshotContext<Self::Offset>) {
        self.calls.lock().push("complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_configured_rows() {
        let mut source = MockSnapshotSource::new("db")
            .with_table(MockTable::numbered(TableId::new("db", "s", "t"), 3));
        let ctx = SnapshotContext::new("db");

        let select = source
            .snapshot_select(&ctx, &TableId::new("db", "s", "t"))
            .unwrap();
        let mut cursor = source.execute_snapshot_query(&select, 100).await.unwrap();

        let mut rows = 0;
        while cursor.next_row().await.unwrap().is_some() {
            rows += 1;
        }
        assert_eq!(rows, 3);
    }

    #[tokio::test]
    async fn test_phase_failure() {
        let mut source = MockSnapshotSource::new("db").fail_in(MockPhase::Lock);
        let mut ctx = SnapshotContext::new("db");
        let token = CancellationToken::new();

        assert!(source.begin_transaction().await.is_ok());
        assert!(source.lock_tables(&token, &mut ctx).await.is_err());
        assert_eq!(*source.calls().lock(), vec!["begin", "lock"]);
    }

    #[test]
    fn test_running_offset() {
        let offset = MemoryOffset::running();
        assert!(offset.is_snapshot_running());

        let mut offset = MemoryOffset::default();
        offset.mark_snapshot_running();
        offset.post_snapshot_completion();
        assert!(!offset.snapshot_running);
        assert_eq!(offset.post_completions, 1);
    }
}
