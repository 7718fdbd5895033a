//! Per-table row export
//!
//! One [`TableExporter`] call scans one captured table through a forward-only
//! cursor and dispatches a snapshot-read event per row. The exporter keeps a
//! one-row lookahead so the globally last row of the run can be marked on the
//! offset before its event is dispatched.

use crate::cancellation::CancellationToken;
use crate::config::SnapshotConfig;
use crate::context::SnapshotContext;
use crate::dispatch::EventDispatcher;
use crate::error::{Result, SnapshotError};
use crate::event::{ChangeEvent, Row};
use crate::listener::SnapshotProgressListener;
use crate::offset::SnapshotOffset;
use crate::source::RelationalSnapshotSource;
use crate::table::{TableDefinition, TableId};
use chrono::Utc;
use std::time::Instant;
use tracing::{info, warn};

/// Exports the rows of one table per call.
pub struct TableExporter<'a> {
    config: &'a SnapshotConfig,
    listener: &'a dyn SnapshotProgressListener,
}

impl<'a> TableExporter<'a> {
    /// Create an exporter over the run configuration and progress listener.
    pub fn new(config: &'a SnapshotConfig, listener: &'a dyn SnapshotProgressListener) -> Self {
        Self { config, listener }
    }

    /// Export all rows of `table`, dispatching one snapshot-read event each.
    ///
    /// A table without a resolvable SELECT is skipped with a warning; skipping
    /// never marks the snapshot boundary, even for the last table. Scan and
    /// coercion failures surface as table-identified errors; cancellation
    /// keeps its own variant.
    pub async fn export<S, D>(
        &self,
        source: &mut S,
        dispatcher: &mut D,
        receiver: &mut D::Receiver,
        ctx: &mut SnapshotContext<S::Offset>,
        table: &TableDefinition,
        token: &CancellationToken,
    ) -> Result<()>
    where
        S: RelationalSnapshotSource,
        D: EventDispatcher<S::Offset>,
    {
        let id = table.id.clone();
        let started = Instant::now();

        let select = match self.resolve_select(source, ctx, &id) {
            Some(select) => select,
            None => {
                warn!(
                    "For table '{}' the select statement was not provided, skipping table",
                    id
                );
                return Ok(());
            }
        };
        info!("For table '{}' using select statement: '{}'", id, select);

        let mut cursor = source
            .execute_snapshot_query(&select, self.config.fetch_size)
            .await
            .map_err(|e| scan_error(&id, e))?;

        let mut rows: u64 = 0;
        let mut log_timer = Instant::now();
        ctx.last_record_in_table = false;

        // One-row lookahead: the slot below always holds the next undispatched
        // row, so end-of-table is known before the current row goes out.
        let mut next = cursor.next_row().await.map_err(|e| scan_error(&id, e))?;

        if next.is_none() {
            if ctx.last_table {
                // Empty last table: the boundary is still marked, without a row.
                ctx.last_record_in_table = true;
                ctx.offset_mut()?.mark_last_snapshot_record();
            }
        } else {
            while let Some(raw) = next.take() {
                if token.is_cancelled() {
                    return Err(SnapshotError::cancelled(format!(
                        "interrupted while snapshotting table '{}'",
                        id
                    )));
                }
                rows += 1;

                let row = coerce_row(source, table, raw).map_err(|e| scan_error(&id, e))?;

                next = cursor.next_row().await.map_err(|e| scan_error(&id, e))?;
                ctx.last_record_in_table = next.is_none();

                if log_timer.elapsed() >= self.config.scan_log_interval {
                    info!(
                        "Exported {} records for table '{}' after {:?}",
                        rows,
                        id,
                        started.elapsed()
                    );
                    self.listener.rows_scanned(&id, rows);
                    log_timer = Instant::now();
                }

                if ctx.last_table && ctx.last_record_in_table {
                    ctx.offset_mut()?.mark_last_snapshot_record();
                }

                let now = Utc::now();
                ctx.offset_mut()?.record_event(&id, now);
                let event = ChangeEvent::snapshot_read(id.clone(), row, now.timestamp_millis());
                dispatcher.dispatch_snapshot_event(receiver, event).await?;
            }
        }

        info!(
            "Finished exporting {} records for table '{}'; total duration {:?}",
            rows,
            id,
            started.elapsed()
        );
        self.listener.table_snapshot_completed(&id, rows);
        Ok(())
    }

    fn resolve_select<S>(
        &self,
        source: &S,
        ctx: &SnapshotContext<S::Offset>,
        id: &TableId,
    ) -> Option<String>
    where
        S: RelationalSnapshotSource,
    {
        if let Some(select) = self.config.select_override_for(id) {
            return Some(select.to_string());
        }
        source.snapshot_select(ctx, id)
    }
}

/// Coerce every cell of a raw row through the capability layer.
fn coerce_row<S>(source: &S, table: &TableDefinition, raw: Row) -> Result<Row>
where
    S: RelationalSnapshotSource,
{
    if raw.len() != table.width() {
        return Err(SnapshotError::runtime(format!(
            "row has {} columns but table definition has {}",
            raw.len(),
            table.width()
        )));
    }
    raw.into_iter()
        .zip(table.columns.iter())
        .map(|(value, column)| source.column_value(value, column))
        .collect()
}

fn scan_error(id: &TableId, err: SnapshotError) -> SnapshotError {
    if err.is_cancellation() {
        err
    } else {
        SnapshotError::table_scan(id, err.to_string())
    }
}
