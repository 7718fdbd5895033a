//! Snapshot orchestration
//!
//! [`SnapshotEngine`] drives one complete snapshot run over a
//! [`RelationalSnapshotSource`]:
//!
//! 1. Classify the run against the prior offset; skip if nothing to do
//! 2. Wait out the configured pre-snapshot delay
//! 3. Prepare the run context and begin the run transaction
//! 4. Determine the captured tables (filter, then order)
//! 5. Lock captured tables (schema runs only)
//! 6. Capture the snapshot offset
//! 7. Read table structure
//! 8. Emit schema events and release locks (schema runs only)
//! 9. Export table data, marking the globally last row on the offset
//! 10. Finalize: heartbeat, rollback of the read transaction, cleanup
//!
//! Rollback and capability cleanup run on every exit path after the context
//! exists, including failures and cancellation. The engine never retries;
//! retry is an outer-layer policy.

use crate::cancellation::CancellationToken;
use crate::config::SnapshotConfig;
use crate::context::SnapshotContext;
use crate::dispatch::{EventDispatcher, SnapshotReceiver};
use crate::error::{Result, SnapshotError};
use crate::export::TableExporter;
use crate::filter::TableFilter;
use crate::listener::{NullProgressListener, SnapshotProgressListener};
use crate::offset::SnapshotOffset;
use crate::schema::SchemaHistory;
use crate::source::{RelationalSnapshotSource, SnapshottingTask};
use crate::table::TableId;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the delay phase wakes up to re-check the cancellation token.
const RETURN_CONTROL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a snapshot run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotResult<O> {
    /// The run completed; streaming may start from the contained offset.
    Completed(O),
    /// Classification decided nothing had to be done; the prior offset, if
    /// any, passes through untouched.
    Skipped(Option<O>),
}

impl<O> SnapshotResult<O> {
    /// The offset to continue from, when one exists.
    pub fn offset(&self) -> Option<&O> {
        match self {
            Self::Completed(offset) => Some(offset),
            Self::Skipped(offset) => offset.as_ref(),
        }
    }

    /// Whether the run actually performed a snapshot.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Engine-agnostic snapshot orchestrator.
///
/// Consumes itself on [`execute`](Self::execute); one engine drives exactly
/// one run.
pub struct SnapshotEngine<S, D>
where
    S: RelationalSnapshotSource,
    D: EventDispatcher<S::Offset>,
{
    config: SnapshotConfig,
    source: S,
    dispatcher: D,
    prior_offset: Option<S::Offset>,
    listener: Arc<dyn SnapshotProgressListener>,
    schema_history: Option<Arc<dyn SchemaHistory>>,
}

impl<S, D> SnapshotEngine<S, D>
where
    S: RelationalSnapshotSource,
    D: EventDispatcher<S::Offset>,
{
    /// Create an engine over a capability implementation and a dispatcher.
    pub fn new(config: SnapshotConfig, source: S, dispatcher: D) -> Self {
        Self {
            config,
            source,
            dispatcher,
            prior_offset: None,
            listener: Arc::new(NullProgressListener),
            schema_history: None,
        }
    }

    /// Supply the offset stored by a previous run, if one exists.
    pub fn with_prior_offset(mut self, offset: S::Offset) -> Self {
        self.prior_offset = Some(offset);
        self
    }

    /// Attach a progress listener.
    pub fn with_listener(mut self, listener: Arc<dyn SnapshotProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Attach a schema history that records emitted schema events.
    pub fn with_schema_history(mut self, history: Arc<dyn SchemaHistory>) -> Self {
        self.schema_history = Some(history);
        self
    }

    /// Run the snapshot to completion, cancellation, or failure.
    ///
    /// `snapshot_completed` or `snapshot_aborted` fires on the listener for
    /// every non-skipped run, never both.
    pub async fn execute(mut self, token: &CancellationToken) -> Result<SnapshotResult<S::Offset>> {
        if let Some(prior) = &self.prior_offset {
            if prior.is_snapshot_running() {
                info!("The previous snapshot was cancelled before completion; a new snapshot will be taken");
            }
        }

        let task = self.source.snapshotting_task(self.prior_offset.as_ref());
        info!("Snapshot run classified as {}", task);
        if task.is_skip() {
            debug!("Skipping snapshotting");
            return Ok(SnapshotResult::Skipped(self.prior_offset));
        }

        self.listener.snapshot_started();
        let outcome = self.run(token, task).await;
        match &outcome {
            Ok(_) => self.listener.snapshot_completed(),
            Err(_) => self.listener.snapshot_aborted(),
        }
        outcome
    }

    async fn run(
        &mut self,
        token: &CancellationToken,
        task: SnapshottingTask,
    ) -> Result<SnapshotResult<S::Offset>> {
        self.delay_if_needed(token).await?;

        token.ensure_running("preparing the snapshot")?;
        let mut ctx = self.source.prepare().await.map_err(init_error)?;

        let result = self.snapshot(token, task, &mut ctx).await;

        // Cleanup runs on every exit path once the context exists.
        if let Err(e) = self.source.rollback().await {
            warn!("Failed to roll back the snapshot read transaction: {}", e);
        }
        self.source.complete(ctx).await;

        result
    }

    async fn snapshot(
        &mut self,
        token: &CancellationToken,
        task: SnapshottingTask,
        ctx: &mut SnapshotContext<S::Offset>,
    ) -> Result<SnapshotResult<S::Offset>> {
        info!("Snapshot step 1 - Preparing");
        self.source.begin_transaction().await.map_err(init_error)?;
        self.source.on_connected(ctx).await.map_err(init_error)?;

        token.ensure_running("determining captured tables")?;
        info!("Snapshot step 2 - Determining captured tables");
        self.determine_captured_tables(ctx).await?;
        self.listener
            .monitored_tables_determined(&ctx.captured_tables);
        if ctx.captured_tables.is_empty() {
            warn!("After applying the include/exclude filters no tables remain to be captured");
        }

        token.ensure_running("locking captured tables")?;
        if task.snapshot_schema {
            info!(
                "Snapshot step 3 - Locking captured tables [{}]",
                display_tables(&ctx.captured_tables)
            );
            self.source.lock_tables(token, ctx).await?;
        } else {
            info!("Snapshot step 3 - Skipping locking of captured tables");
        }

        token.ensure_running("determining the snapshot offset")?;
        info!("Snapshot step 4 - Determining snapshot offset");
        self.source.determine_offset(ctx).await?;

        token.ensure_running("reading table structure")?;
        info!("Snapshot step 5 - Reading structure of captured tables");
        self.source.read_table_structure(token, ctx).await?;

        token.ensure_running("persisting schema history")?;
        if task.snapshot_schema {
            info!("Snapshot step 6 - Persisting schema history");
            self.create_schema_events(token, ctx).await?;
            self.source.release_locks(ctx).await?;
        } else {
            info!("Snapshot step 6 - Skipping persisting of schema history");
        }

        token.ensure_running("snapshotting data")?;
        if task.snapshot_data {
            info!("Snapshot step 7 - Snapshotting data");
            self.create_data_events(token, ctx).await?;
        } else {
            // Locks, when taken, were already released in step 6.
            info!("Snapshot step 7 - Skipping snapshotting of data");
            let offset = ctx.offset_mut()?;
            offset.pre_snapshot_completion();
            offset.post_snapshot_completion();
        }

        info!("Snapshot - Final stage");
        let offset = ctx
            .offset
            .clone()
            .ok_or_else(|| SnapshotError::runtime("snapshot offset not initialized"))?;
        self.dispatcher.dispatch_heartbeat(&offset).await?;
        Ok(SnapshotResult::Completed(offset))
    }

    async fn delay_if_needed(&self, token: &CancellationToken) -> Result<()> {
        let Some(delay) = self.config.snapshot_delay else {
            return Ok(());
        };
        if delay.is_zero() {
            return Ok(());
        }

        info!("Snapshot step 0 - Delaying snapshot by {:?}", delay);
        let deadline = Instant::now() + delay;
        loop {
            token.ensure_running("waiting for the pre-snapshot delay")?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(());
            }
            debug!("The snapshot will wait for {:?} before proceeding", remaining);
            tokio::time::sleep(remaining.min(RETURN_CONTROL_INTERVAL)).await;
        }
    }

    async fn determine_captured_tables(
        &mut self,
        ctx: &mut SnapshotContext<S::Offset>,
    ) -> Result<()> {
        let all = self.source.all_table_ids(ctx).await?;
        let filter = TableFilter::from_config(&self.config)?;
        let captured: Vec<TableId> = all.into_iter().filter(|id| filter.is_included(id)).collect();

        ctx.captured_tables = order_tables(captured, &self.config.table_order)?;
        for id in &ctx.captured_tables {
            debug!("Adding table '{}' to the list of captured tables", id);
        }
        Ok(())
    }

    async fn create_schema_events(
        &mut self,
        token: &CancellationToken,
        ctx: &mut SnapshotContext<S::Offset>,
    ) -> Result<()> {
        let captured = ctx.captured_tables.clone();
        for id in &captured {
            token.ensure_running(&format!("capturing schema of table '{}'", id))?;
            let definition = ctx.tables.for_table(id).cloned().ok_or_else(|| {
                SnapshotError::initialization(format!(
                    "no structure read for captured table '{}'",
                    id
                ))
            })?;

            debug!("Capturing structure of table '{}'", id);
            let event = self.source.create_table_event(ctx, &definition)?;
            if let Some(history) = &self.schema_history {
                history.record(&event).await?;
            }
        }
        Ok(())
    }

    async fn create_data_events(
        &mut self,
        token: &CancellationToken,
        ctx: &mut SnapshotContext<S::Offset>,
    ) -> Result<()> {
        let mut receiver = self.dispatcher.snapshot_receiver();

        {
            let offset = ctx.offset_mut()?;
            if !offset.is_snapshot_running() {
                offset.mark_snapshot_running();
            }
        }

        let captured = ctx.captured_tables.clone();
        let total = captured.len();
        for (n, id) in captured.iter().enumerate() {
            token.ensure_running(&format!("snapshotting table '{}'", id))?;
            ctx.last_table = n + 1 == total;
            info!(
                "Exporting data from table '{}' ({} of {} tables)",
                id,
                n + 1,
                total
            );

            let definition = ctx.tables.for_table(id).cloned().ok_or_else(|| {
                SnapshotError::initialization(format!(
                    "no structure read for captured table '{}'",
                    id
                ))
            })?;

            let exporter = TableExporter::new(&self.config, self.listener.as_ref());
            exporter
                .export(
                    &mut self.source,
                    &mut self.dispatcher,
                    &mut receiver,
                    ctx,
                    &definition,
                    token,
                )
                .await?;
        }

        ctx.offset_mut()?.pre_snapshot_completion();
        receiver.complete_snapshot().await?;
        ctx.offset_mut()?.post_snapshot_completion();
        Ok(())
    }
}

// Preparation failures are run-init errors; cancellation keeps its own kind.
fn init_error(err: SnapshotError) -> SnapshotError {
    if err.is_cancellation() {
        err
    } else {
        SnapshotError::initialization(err.to_string())
    }
}

fn display_tables(tables: &[TableId]) -> String {
    tables
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Order captured tables for export.
///
/// With no ordering patterns the whole set sorts by qualified name. With
/// patterns, tables are grouped by the first pattern they match, groups keep
/// the pattern order, each group sorts internally, and tables matching no
/// pattern follow at the end in name order. Duplicates are dropped.
fn order_tables(tables: Vec<TableId>, patterns: &[String]) -> Result<Vec<TableId>> {
    let mut seen = std::collections::HashSet::new();
    let mut tables: Vec<TableId> = tables.into_iter().filter(|id| seen.insert(id.clone())).collect();

    if patterns.is_empty() {
        tables.sort();
        return Ok(tables);
    }

    let matchers = patterns
        .iter()
        .map(|p| crate::pattern::PatternMatcher::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut groups: Vec<Vec<TableId>> = vec![Vec::new(); matchers.len()];
    let mut unmatched = Vec::new();
    for id in tables {
        let qualified = id.qualified_name();
        match matchers
            .iter()
            .position(|m| m.matches_qualified(&qualified, &id.table))
        {
            Some(i) => groups[i].push(id),
            None => unmatched.push(id),
        }
    }

    let mut ordered = Vec::new();
    for mut group in groups {
        group.sort();
        ordered.extend(group);
    }
    unmatched.sort();
    ordered.extend(unmatched);
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CollectingDispatcher;
    use crate::error::ErrorCategory;
    use crate::event::ChangeOp;
    use crate::mock::{MemoryOffset, MockPhase, MockSnapshotSource, MockTable};
    use crate::schema::{MemorySchemaHistory, SchemaChangeEvent};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        entries: Mutex<Vec<String>>,
    }

    impl RecordingListener {
        fn entries(&self) -> Vec<String> {
            self.entries.lock().clone()
        }
    }

    impl SnapshotProgressListener for RecordingListener {
        fn snapshot_started(&self) {
            self.entries.lock().push("started".to_string());
        }
        fn monitored_tables_determined(&self, tables: &[TableId]) {
            self.entries.lock().push(format!("tables:{}", tables.len()));
        }
        fn table_snapshot_completed(&self, table: &TableId, rows: u64) {
            self.entries
                .lock()
                .push(format!("table:{}:{}", table.table, rows));
        }
        fn snapshot_completed(&self) {
            self.entries.lock().push("completed".to_string());
        }
        fn snapshot_aborted(&self) {
            self.entries.lock().push("aborted".to_string());
        }
    }

    /// History that requests cancellation right after its first record.
    struct CancellingHistory {
        inner: MemorySchemaHistory,
        token: CancellationToken,
    }

    #[async_trait::async_trait]
    impl SchemaHistory for CancellingHistory {
        async fn record(&self, event: &SchemaChangeEvent) -> Result<()> {
            self.inner.record(event).await?;
            self.token.cancel();
            Ok(())
        }
    }

    /// Listener that requests cancellation once the first table finishes.
    struct CancellingListener {
        token: CancellationToken,
    }

    impl SnapshotProgressListener for CancellingListener {
        fn table_snapshot_completed(&self, _table: &TableId, _rows: u64) {
            self.token.cancel();
        }
    }

    fn two_table_source() -> MockSnapshotSource {
        MockSnapshotSource::new("db")
            .with_table(MockTable::numbered(TableId::new("db", "public", "a"), 2))
            .with_table(MockTable::numbered(TableId::new("db", "public", "b"), 3))
    }

    #[tokio::test]
    async fn test_full_run_dispatches_all_rows_in_table_order() {
        let dispatcher: CollectingDispatcher<MemoryOffset> = CollectingDispatcher::new();
        let log = dispatcher.log();
        let source = two_table_source();
        let calls = source.calls();

        let engine = SnapshotEngine::new(SnapshotConfig::default(), source, dispatcher);
        let result = engine.execute(&CancellationToken::new()).await.unwrap();

        let offset = match result {
            SnapshotResult::Completed(offset) => offset,
            other => panic!("expected completed run, got {:?}", other),
        };
        assert_eq!(offset.marked_running, 1);
        assert_eq!(offset.events, 5);
        assert_eq!(offset.last_marked, 1);
        // The boundary mark landed before the final record_event
        assert_eq!(offset.events_at_last_mark, Some(4));
        assert_eq!(offset.pre_completions, 1);
        assert_eq!(offset.post_completions, 1);
        assert!(!offset.snapshot_running);

        let log = log.lock();
        assert_eq!(log.events.len(), 5);
        assert!(log.events.iter().all(|e| e.op == ChangeOp::SnapshotRead));
        assert_eq!(log.events[0].table.table, "a");
        assert_eq!(log.events[2].table.table, "b");
        assert_eq!(log.completions, 1);
        assert_eq!(log.receivers, 1);
        assert_eq!(log.heartbeats.len(), 1);

        assert_eq!(
            *calls.lock(),
            vec![
                "prepare",
                "begin",
                "lock",
                "offset",
                "structure",
                "release",
                "rollback",
                "complete"
            ]
        );
    }

    #[tokio::test]
    async fn test_schema_history_records_every_captured_table() {
        let history = Arc::new(MemorySchemaHistory::new());
        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            two_table_source(),
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_schema_history(history.clone());

        engine.execute(&CancellationToken::new()).await.unwrap();

        let events = history.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].table.table, "a");
        assert_eq!(events[1].table.table, "b");
        assert!(events[0].ddl.as_deref().unwrap().starts_with("CREATE TABLE"));
    }

    #[tokio::test]
    async fn test_skip_classification_passes_prior_offset_through() {
        let listener = Arc::new(RecordingListener::default());
        let source = two_table_source().with_task(SnapshottingTask::new(false, false));
        let calls = source.calls();
        let prior = MemoryOffset::default();

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_prior_offset(prior.clone())
        .with_listener(listener.clone());

        let result = engine.execute(&CancellationToken::new()).await.unwrap();
        assert_eq!(result, SnapshotResult::Skipped(Some(prior)));
        assert!(!result.is_completed());
        assert!(calls.lock().is_empty());
        assert!(listener.entries().is_empty());
    }

    #[tokio::test]
    async fn test_schema_only_run_skips_data_but_completes_offset() {
        let dispatcher: CollectingDispatcher<MemoryOffset> = CollectingDispatcher::new();
        let log = dispatcher.log();
        let source = two_table_source().with_task(SnapshottingTask::new(true, false));

        let engine = SnapshotEngine::new(SnapshotConfig::default(), source, dispatcher);
        let result = engine.execute(&CancellationToken::new()).await.unwrap();

        let offset = result.offset().cloned().unwrap();
        assert_eq!(offset.events, 0);
        assert_eq!(offset.last_marked, 0);
        assert_eq!(offset.marked_running, 0);
        assert_eq!(offset.pre_completions, 1);
        assert_eq!(offset.post_completions, 1);

        let log = log.lock();
        assert!(log.events.is_empty());
        assert_eq!(log.receivers, 0);
        assert_eq!(log.heartbeats.len(), 1);
    }

    #[tokio::test]
    async fn test_data_only_run_takes_no_locks() {
        let source = two_table_source().with_task(SnapshottingTask::new(false, true));
        let calls = source.calls();
        let history = Arc::new(MemorySchemaHistory::new());

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_schema_history(history.clone());

        let result = engine.execute(&CancellationToken::new()).await.unwrap();
        assert!(result.is_completed());
        assert!(history.is_empty());

        let calls = calls.lock();
        assert!(!calls.contains(&"lock"));
        assert!(!calls.contains(&"release"));
    }

    #[tokio::test]
    async fn test_filters_reduce_captured_tables() {
        let listener = Arc::new(RecordingListener::default());
        let config = SnapshotConfig::builder().exclude_table("*.public.b").build();

        let engine = SnapshotEngine::new(
            config,
            two_table_source(),
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_listener(listener.clone());

        let result = engine.execute(&CancellationToken::new()).await.unwrap();
        let offset = result.offset().cloned().unwrap();
        assert_eq!(offset.events, 2);
        // Table 'a' is now the last table, so the boundary moved with it
        assert_eq!(offset.last_marked, 1);
        assert!(listener.entries().contains(&"tables:1".to_string()));
    }

    #[tokio::test]
    async fn test_empty_last_table_marks_boundary_and_empty_middle_does_not() {
        let source = MockSnapshotSource::new("db")
            .with_table(MockTable::numbered(TableId::new("db", "public", "a"), 0))
            .with_table(MockTable::numbered(TableId::new("db", "public", "b"), 2))
            .with_table(MockTable::numbered(TableId::new("db", "public", "z"), 0));

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        );
        let result = engine.execute(&CancellationToken::new()).await.unwrap();

        let offset = result.offset().cloned().unwrap();
        assert_eq!(offset.events, 2);
        // Only the empty *last* table marked the boundary, after all events
        assert_eq!(offset.last_marked, 1);
        assert_eq!(offset.events_at_last_mark, Some(2));
    }

    #[tokio::test]
    async fn test_last_table_without_select_never_marks_boundary() {
        let source = MockSnapshotSource::new("db")
            .with_table(MockTable::numbered(TableId::new("db", "public", "a"), 2))
            .with_table(MockTable::numbered(TableId::new("db", "public", "z"), 3).no_select());

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        );
        let result = engine.execute(&CancellationToken::new()).await.unwrap();

        let offset = result.offset().cloned().unwrap();
        assert_eq!(offset.events, 2);
        assert_eq!(offset.last_marked, 0);
        assert_eq!(offset.pre_completions, 1);
        assert_eq!(offset.post_completions, 1);
    }

    #[tokio::test]
    async fn test_override_default_and_missing_select_mix() {
        let listener = Arc::new(RecordingListener::default());
        let dispatcher: CollectingDispatcher<MemoryOffset> = CollectingDispatcher::new();
        let log = dispatcher.log();

        // a: default SELECT; b: served through an override; c: no SELECT at all
        let source = MockSnapshotSource::new("db")
            .with_table(MockTable::numbered(TableId::new("db", "public", "a"), 1))
            .with_table(
                MockTable::numbered(TableId::new("db", "public", "b"), 2)
                    .with_select("SELECT id FROM b WHERE id > 0"),
            )
            .with_table(MockTable::numbered(TableId::new("db", "public", "c"), 4).no_select());

        let config = SnapshotConfig::builder()
            .select_override("public.b", "SELECT id FROM b WHERE id > 0")
            .build();

        let engine =
            SnapshotEngine::new(config, source, dispatcher).with_listener(listener.clone());
        let result = engine.execute(&CancellationToken::new()).await.unwrap();

        assert!(result.is_completed());
        assert_eq!(log.lock().events.len(), 3);

        let entries = listener.entries();
        assert!(entries.contains(&"table:a:1".to_string()));
        assert!(entries.contains(&"table:b:2".to_string()));
        assert!(!entries.iter().any(|e| e.starts_with("table:c")));
    }

    #[tokio::test]
    async fn test_cancellation_mid_run_aborts_and_cleans_up() {
        let listener = Arc::new(RecordingListener::default());
        let token = CancellationToken::new();
        let source = two_table_source().cancel_in(MockPhase::Lock, token.clone());
        let calls = source.calls();

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_listener(listener.clone());

        let err = engine.execute(&token).await.unwrap_err();
        assert!(err.is_cancellation());

        let calls = calls.lock();
        assert!(calls.contains(&"rollback"));
        assert!(calls.contains(&"complete"));
        assert!(!calls.contains(&"structure"));

        let entries = listener.entries();
        assert!(entries.contains(&"started".to_string()));
        assert!(entries.contains(&"aborted".to_string()));
        assert!(!entries.contains(&"completed".to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_during_schema_capture_stops_after_current_table() {
        let token = CancellationToken::new();
        let history = Arc::new(CancellingHistory {
            inner: MemorySchemaHistory::new(),
            token: token.clone(),
        });

        let mut source = MockSnapshotSource::new("db");
        for name in ["a", "b", "c", "d", "e"] {
            source = source.with_table(MockTable::numbered(TableId::new("db", "public", name), 1));
        }

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_schema_history(history.clone());

        let err = engine.execute(&token).await.unwrap_err();
        assert!(err.is_cancellation());

        // Only the table whose record triggered the cancellation made it in
        let recorded: Vec<String> = history
            .inner
            .events()
            .iter()
            .map(|e| e.table.table.clone())
            .collect();
        assert_eq!(recorded, vec!["a"]);
    }

    #[tokio::test]
    async fn test_preparation_failures_are_initialization_errors() {
        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            two_table_source().fail_in(MockPhase::Prepare),
            CollectingDispatcher::<MemoryOffset>::new(),
        );
        let err = engine.execute(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Initialization);

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            two_table_source().fail_in(MockPhase::Begin),
            CollectingDispatcher::<MemoryOffset>::new(),
        );
        let err = engine.execute(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Initialization);
    }

    #[tokio::test]
    async fn test_cancellation_between_tables_gates_selectless_tail() {
        let token = CancellationToken::new();
        let source = MockSnapshotSource::new("db")
            .with_table(MockTable::numbered(TableId::new("db", "public", "a"), 1))
            .with_table(MockTable::numbered(TableId::new("db", "public", "z"), 3).no_select());

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_listener(Arc::new(CancellingListener {
            token: token.clone(),
        }));

        // Without the per-table gate the select-less tail would let the run
        // complete despite the cancellation raised after table 'a'
        let err = engine.execute(&token).await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(err.to_string().contains("db.public.z"));
    }

    #[tokio::test]
    async fn test_cursor_failure_surfaces_table_scan_error() {
        let listener = Arc::new(RecordingListener::default());
        let source = MockSnapshotSource::new("db").with_table(
            MockTable::numbered(TableId::new("db", "public", "a"), 5).fail_after_rows(2),
        );
        let calls = source.calls();

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_listener(listener.clone());

        let err = engine.execute(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SnapshotError::TableScan { .. }));
        assert!(err.to_string().contains("db.public.a"));

        let calls = calls.lock();
        assert!(calls.contains(&"rollback"));
        assert!(calls.contains(&"complete"));
        assert!(listener.entries().contains(&"aborted".to_string()));
    }

    #[tokio::test]
    async fn test_phase_failure_still_rolls_back() {
        let source = two_table_source().fail_in(MockPhase::Structure);
        let calls = source.calls();

        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            source,
            CollectingDispatcher::<MemoryOffset>::new(),
        );
        let err = engine.execute(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SnapshotError::Database(_)));

        let calls = calls.lock();
        assert!(calls.contains(&"rollback"));
        assert!(calls.contains(&"complete"));
    }

    #[tokio::test]
    async fn test_running_prior_offset_takes_fresh_snapshot() {
        let engine = SnapshotEngine::new(
            SnapshotConfig::default(),
            two_table_source(),
            CollectingDispatcher::<MemoryOffset>::new(),
        )
        .with_prior_offset(MemoryOffset::running());

        let result = engine.execute(&CancellationToken::new()).await.unwrap();
        assert!(result.is_completed());
    }

    #[tokio::test]
    async fn test_delay_respects_cancellation() {
        let token = CancellationToken::new();
        token.cancel();

        let config = SnapshotConfig::builder()
            .snapshot_delay(Duration::from_secs(3600))
            .build();
        let source = two_table_source();
        let calls = source.calls();

        let engine =
            SnapshotEngine::new(config, source, CollectingDispatcher::<MemoryOffset>::new());
        let started = Instant::now();
        let err = engine.execute(&token).await.unwrap_err();

        assert!(err.is_cancellation());
        assert!(started.elapsed() < Duration::from_secs(5));
        // Cancelled before prepare, so no cleanup hooks ran
        assert!(calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_short_delay_elapses() {
        let config = SnapshotConfig::builder()
            .snapshot_delay(Duration::from_millis(50))
            .build();

        let engine = SnapshotEngine::new(
            config,
            two_table_source(),
            CollectingDispatcher::<MemoryOffset>::new(),
        );
        let started = Instant::now();
        let result = engine.execute(&CancellationToken::new()).await.unwrap();

        assert!(result.is_completed());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    fn id(schema: &str, table: &str) -> TableId {
        TableId::new("db", schema, table)
    }

    #[test]
    fn test_order_tables_default_is_name_order() {
        let ordered = order_tables(
            vec![id("s", "c"), id("s", "a"), id("s", "b")],
            &[],
        )
        .unwrap();
        assert_eq!(ordered, vec![id("s", "a"), id("s", "b"), id("s", "c")]);
    }

    #[test]
    fn test_order_tables_groups_by_pattern() {
        let ordered = order_tables(
            vec![
                id("ref", "currencies"),
                id("sales", "orders"),
                id("ref", "countries"),
                id("audit", "log"),
            ],
            &["*.ref.*".to_string(), "*.sales.*".to_string()],
        )
        .unwrap();
        // Reference data first, then sales, then everything else
        assert_eq!(
            ordered,
            vec![
                id("ref", "countries"),
                id("ref", "currencies"),
                id("sales", "orders"),
                id("audit", "log"),
            ]
        );
    }

    #[test]
    fn test_order_tables_first_matching_pattern_wins() {
        let ordered = order_tables(
            vec![id("s", "ab"), id("s", "b")],
            &["*.s.a*".to_string(), "*.s.*".to_string()],
        )
        .unwrap();
        assert_eq!(ordered, vec![id("s", "ab"), id("s", "b")]);
    }

    #[test]
    fn test_order_tables_drops_duplicates() {
        let ordered = order_tables(vec![id("s", "a"), id("s", "a")], &[]).unwrap();
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn test_order_tables_rejects_bad_pattern() {
        assert!(order_tables(vec![id("s", "a")], &["".to_string()]).is_err());
    }
}
