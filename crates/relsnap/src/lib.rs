//! # relsnap - Initial snapshots for relational CDC
//!
//! Engine-agnostic orchestration of the consistent initial snapshot that
//! precedes log-based change streaming: schema capture and bulk table export
//! against a single read transaction, emitting the same change-event shape the
//! streaming phase uses.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌───────────┐
//! │PostgreSQL │   │  MySQL    │   │SQL Server │
//! │  source   │   │  source   │   │  source   │
//! └─────┬─────┘   └─────┬─────┘   └─────┬─────┘
//!       │               │               │
//!       ▼               ▼               ▼
//! ┌──────────────────────────────────────────────┐
//! │        RelationalSnapshotSource Trait        │
//! │  (locking, offsets, structure, row cursors)  │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │                SnapshotEngine                │
//! │  classify → delay → lock → offset → schema   │
//! │          → export tables → finalize          │
//! └──────────────────────┬───────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │          EventDispatcher / receiver          │
//! │   ChangeEvent { op: SNAPSHOT, after, ... }   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relsnap::{
//!     CancellationToken, CollectingDispatcher, MemorySchemaHistory, SnapshotConfig,
//!     SnapshotEngine,
//! };
//! use relsnap::mock::{MemoryOffset, MockSnapshotSource, MockTable};
//! use relsnap::TableId;
//!
//! # async fn example() -> relsnap::Result<()> {
//! let source = MockSnapshotSource::new("inventory")
//!     .with_table(MockTable::numbered(TableId::new("inventory", "public", "orders"), 100));
//! let dispatcher: CollectingDispatcher<MemoryOffset> = CollectingDispatcher::new();
//!
//! let config = SnapshotConfig::builder()
//!     .include_table("public.*")
//!     .fetch_size(1_000)
//!     .build();
//!
//! let engine = SnapshotEngine::new(config, source, dispatcher)
//!     .with_schema_history(Arc::new(MemorySchemaHistory::new()));
//!
//! let result = engine.execute(&CancellationToken::new()).await?;
//! assert!(result.is_completed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - All rows are read against one transaction's view; the run transaction is
//!   always rolled back, never committed
//! - Exactly one last-record boundary mark per completed data run, placed on
//!   the offset before the final event is dispatched
//! - Cancellation latency is bounded by one row read or one 100ms delay poll
//! - Capability cleanup (`rollback`, `complete`) runs on every exit path once
//!   the run context exists

pub mod cancellation;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod export;
pub mod filter;
pub mod listener;
pub mod mock;
pub mod offset;
pub mod pattern;
pub mod schema;
pub mod source;
pub mod table;

// Core types for running a snapshot
pub use cancellation::CancellationToken;
pub use config::{SnapshotConfig, SnapshotConfigBuilder, DEFAULT_FETCH_SIZE};
pub use engine::{SnapshotEngine, SnapshotResult};
pub use error::{ErrorCategory, Result, SnapshotError};
pub use event::{ChangeEvent, ChangeOp, Row};
pub use source::{RelationalSnapshotSource, RowCursor, SnapshottingTask};
pub use table::{Column, TableDefinition, TableId, Tables};

// Integration-surface types for hosts and capability implementations
pub use context::SnapshotContext;
pub use dispatch::{CollectingDispatcher, DispatchLog, EventDispatcher, SnapshotReceiver};
pub use listener::{NullProgressListener, SnapshotProgressListener};
pub use offset::SnapshotOffset;
pub use schema::{MemorySchemaHistory, SchemaChangeEvent, SchemaChangeType, SchemaHistory};
