//! # Catalog Interface
//!
//! The catalog provides the optimizer with metadata about base tables: their
//! column definitions and table-level statistics. Scans built through the
//! catalog carry the row count the cost model starts from.
//!
//! ## Trait Design
//!
//! The `Catalog` trait is intentionally minimal and used as `dyn Catalog` so
//! different backends can provide metadata. The `InMemoryCatalog` is a
//! HashMap-based implementation that can be populated programmatically or
//! deserialized from JSON.
//!
//! ## Key Lookups
//!
//! Tables are identified by `TableRef` (schema + name). The catalog returns:
//! - `get_table_stats`: row count and total size. `None` if the table is unknown.
//! - `get_table_columns`: the table's row type. `None` if the table is unknown.

use crate::expr::{RowType, TableRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Table-level statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: f64,
    #[serde(default)]
    pub total_size_bytes: f64,
}

impl Statistics {
    pub fn new(row_count: f64, total_size_bytes: f64) -> Self {
        Self {
            row_count,
            total_size_bytes,
        }
    }
}

/// Catalog provides schema and statistics information.
pub trait Catalog: Send + Sync {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics>;
    fn get_table_columns(&self, table: &TableRef) -> Option<RowType>;
}

/// One table entry of an `InMemoryCatalog`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub columns: RowType,
    pub stats: Statistics,
}

/// In-memory catalog for services and tests.
///
/// Tables are keyed by their fully-qualified name (`schema.table`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    pub tables: HashMap<String, TableEntry>,
}

fn key(table: &TableRef) -> String {
    format!("{}.{}", table.schema, table.name)
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: &TableRef, columns: RowType, stats: Statistics) {
        self.tables.insert(key(table), TableEntry { columns, stats });
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Catalog for InMemoryCatalog {
    fn get_table_stats(&self, table: &TableRef) -> Option<Statistics> {
        self.tables.get(&key(table)).map(|t| t.stats.clone())
    }

    fn get_table_columns(&self, table: &TableRef) -> Option<RowType> {
        self.tables.get(&key(table)).map(|t| t.columns.clone())
    }
}
