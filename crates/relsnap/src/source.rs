//! Backend capability interface
//!
//! Everything that differs per database engine — classification, locking,
//! offset capture, structure reading, default SELECTs, value coercion — is
//! supplied through [`RelationalSnapshotSource`]. The engine consumes this
//! trait and is otherwise fully engine-agnostic.
//!
//! A transaction is managed by the engine; implementations must not roll back
//! or commit it. They are free to use nested transactions or savepoints.

use crate::cancellation::CancellationToken;
use crate::context::SnapshotContext;
use crate::error::Result;
use crate::event::Row;
use crate::offset::SnapshotOffset;
use crate::schema::SchemaChangeEvent;
use crate::table::{Column, TableDefinition, TableId};
use async_trait::async_trait;
use std::fmt;

/// What a snapshot run has to do, decided once at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshottingTask {
    /// Whether the schema of captured tables should be snapshotted
    pub snapshot_schema: bool,
    /// Whether data (rows in captured tables) should be snapshotted
    pub snapshot_data: bool,
}

impl SnapshottingTask {
    /// Create a task description.
    pub fn new(snapshot_schema: bool, snapshot_data: bool) -> Self {
        Self {
            snapshot_schema,
            snapshot_data,
        }
    }

    /// Neither schema nor data require snapshotting.
    pub fn is_skip(&self) -> bool {
        !self.snapshot_schema && !self.snapshot_data
    }
}

impl fmt::Display for SnapshottingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SnapshottingTask [snapshot_schema={}, snapshot_data={}]",
            self.snapshot_schema, self.snapshot_data
        )
    }
}

/// Forward-only cursor over a snapshot query's rows.
///
/// Implementations are bounded by the configured fetch size; the engine layers
/// its own one-row lookahead on top, so no end-of-stream peeking is required
/// here.
#[async_trait]
pub trait RowCursor: Send {
    /// Read the next row, or `None` at end of stream.
    async fn next_row(&mut self) -> Result<Option<Row>>;
}

/// Capability interface a concrete database engine supplies.
///
/// One implementation exists per supported engine. All methods receive the
/// run-scoped [`SnapshotContext`]; none may commit or roll back the run
/// transaction.
#[async_trait]
pub trait RelationalSnapshotSource: Send {
    /// Engine-specific snapshot offset (WAL LSN, binlog position, SCN, ...).
    type Offset: SnapshotOffset + Clone + Send + Sync + 'static;

    /// Decide what this run has to do, given the prior stored offset.
    fn snapshotting_task(&self, prior_offset: Option<&Self::Offset>) -> SnapshottingTask;

    /// Build a fresh run context scoped to one catalog.
    async fn prepare(&mut self) -> Result<SnapshotContext<Self::Offset>>;

    /// Open the connection and begin the single run-long read transaction.
    async fn begin_transaction(&mut self) -> Result<()>;

    /// Hook invoked right after the connection is established.
    async fn on_connected(&mut self, _ctx: &mut SnapshotContext<Self::Offset>) -> Result<()> {
        Ok(())
    }

    /// All candidate tables; the engine applies the configured filter to this.
    async fn all_table_ids(&mut self, ctx: &SnapshotContext<Self::Offset>) -> Result<Vec<TableId>>;

    /// Lock all captured tables against concurrent structural change.
    async fn lock_tables(
        &mut self,
        token: &CancellationToken,
        ctx: &mut SnapshotContext<Self::Offset>,
    ) -> Result<()>;

    /// Capture the current log/transaction position into `ctx.offset`.
    async fn determine_offset(&mut self, ctx: &mut SnapshotContext<Self::Offset>) -> Result<()>;

    /// Read the structure of every captured table into `ctx.tables`.
    async fn read_table_structure(
        &mut self,
        token: &CancellationToken,
        ctx: &mut SnapshotContext<Self::Offset>,
    ) -> Result<()>;

    /// Release the locks taken by `lock_tables`.
    async fn release_locks(&mut self, ctx: &mut SnapshotContext<Self::Offset>) -> Result<()>;

    /// Build the schema-creation event for one captured table.
    fn create_table_event(
        &self,
        ctx: &SnapshotContext<Self::Offset>,
        table: &TableDefinition,
    ) -> Result<SchemaChangeEvent>;

    /// Default SELECT for scanning a table, or `None` if the table should be
    /// streamed from but not snapshotted.
    fn snapshot_select(
        &self,
        ctx: &SnapshotContext<Self::Offset>,
        id: &TableId,
    ) -> Option<String>;

    /// Open a forward-only, fetch-size-bounded cursor for a snapshot query.
    async fn execute_snapshot_query(
        &mut self,
        select: &str,
        fetch_size: u32,
    ) -> Result<Box<dyn RowCursor>>;

    /// Coerce one raw cell value. Defaults to identity.
    fn column_value(&self, raw: serde_json::Value, _column: &Column) -> Result<serde_json::Value> {
        Ok(raw)
    }

    /// Roll back the run transaction. Invoked by the engine on every exit path.
    async fn rollback(&mut self) -> Result<()>;

    /// Final cleanup (resource disposal etc.). Always invoked at run end.
    async fn complete(&mut self, ctx: SnapshotContext<Self::Offset>);
}
