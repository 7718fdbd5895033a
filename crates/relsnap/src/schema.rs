//! Schema-change events and schema history
//!
//! During the schema phase the engine emits one CREATE event per captured
//! table, built by the capability layer (which knows the engine's DDL
//! spelling), and applies it to a [`SchemaHistory`] when one is configured.

use crate::error::Result;
use crate::table::{TableDefinition, TableId};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Type of schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaChangeType {
    /// Table created (the only type emitted during a snapshot)
    Create,
    /// Table altered
    Alter,
    /// Table dropped
    Drop,
}

/// A schema change captured for the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChangeEvent {
    /// Table the change applies to
    pub table: TableId,
    /// Type of schema change
    pub change_type: SchemaChangeType,
    /// Original DDL statement, when the capability layer can produce one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ddl: Option<String>,
    /// Table structure after the change
    pub definition: TableDefinition,
    /// Event timestamp (Unix epoch millis)
    pub timestamp_ms: i64,
}

impl SchemaChangeEvent {
    /// Create a CREATE event for a table definition.
    pub fn create(definition: TableDefinition, ddl: Option<String>) -> Self {
        Self {
            table: definition.id.clone(),
            change_type: SchemaChangeType::Create,
            ddl,
            definition,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Recorder of schema-change events.
///
/// Connectors that historize schema (for log-based streaming after the
/// snapshot) implement this; connectors without a schema history simply don't
/// configure one.
#[async_trait]
pub trait SchemaHistory: Send + Sync {
    /// Apply a schema change to the history.
    async fn record(&self, event: &SchemaChangeEvent) -> Result<()>;
}

/// In-memory schema history, mainly for tests and embedded use.
#[derive(Default)]
pub struct MemorySchemaHistory {
    events: Mutex<Vec<SchemaChangeEvent>>,
}

impl MemorySchemaHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in order.
    pub fn events(&self) -> Vec<SchemaChangeEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if the history is empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl SchemaHistory for MemorySchemaHistory {
    async fn record(&self, event: &SchemaChangeEvent) -> Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
