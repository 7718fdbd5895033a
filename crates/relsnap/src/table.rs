//! Table identity and structural metadata
//!
//! [`TableId`] is the (catalog, schema, table) triple used throughout the
//! engine; it orders lexicographically by its qualified string form so default
//! table ordering is deterministic. [`TableDefinition`] carries the ordered
//! column list read during the structure phase and is immutable afterwards.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// Identifier of a table: catalog (optional), schema, and table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId {
    /// Catalog/database name; absent for engines without a catalog level
    pub catalog: Option<String>,
    /// Schema name
    pub schema: String,
    /// Table name
    pub table: String,
}

impl TableId {
    /// Create a table identifier with a catalog.
    pub fn new(
        catalog: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: Some(catalog.into()),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Create a table identifier without a catalog.
    pub fn without_catalog_parts(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// The same identifier with the catalog stripped.
    ///
    /// Used to match select overrides keyed by partially qualified names.
    pub fn without_catalog(&self) -> Self {
        Self {
            catalog: None,
            schema: self.schema.clone(),
            table: self.table.clone(),
        }
    }

    /// Fully qualified name (`catalog.schema.table` or `schema.table`).
    pub fn qualified_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.catalog {
            Some(catalog) => write!(f, "{}.{}.{}", catalog, self.schema, self.table),
            None => write!(f, "{}.{}", self.schema, self.table),
        }
    }
}

// Total order over the qualified string form; default captured-table ordering
// must be reproducible from the same metadata.
impl Ord for TableId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for TableId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A column of a table: name, 1-based position, and declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// 1-based ordinal position within the table
    pub position: u32,
    /// Declared database type name (engine-specific spelling)
    pub type_name: String,
}

impl Column {
    /// Create a column descriptor.
    pub fn new(name: impl Into<String>, position: u32, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position,
            type_name: type_name.into(),
        }
    }
}

/// Structure of a table: identifier plus ordered columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table identifier
    pub id: TableId,
    /// Columns in ordinal order
    pub columns: Vec<Column>,
}

impl TableDefinition {
    /// Create a table definition.
    pub fn new(id: TableId, columns: Vec<Column>) -> Self {
        Self { id, columns }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Registry of table definitions, populated during the structure phase.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    definitions: HashMap<TableId, TableDefinition>,
}

impl Tables {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a table definition.
    pub fn overwrite(&mut self, definition: TableDefinition) {
        self.definitions.insert(definition.id.clone(), definition);
    }

    /// Look up the definition for a table.
    pub fn for_table(&self, id: &TableId) -> Option<&TableDefinition> {
        self.definitions.get(id)
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
