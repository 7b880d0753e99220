//! Table store - the shared registry of ingested tables
//!
//! One store instance owns every registered table. Ingestion and deletion
//! are exclusive writers; listing, paging, searching and joining are
//! readers that may run concurrently with each other. A join takes a
//! single read guard for its whole execution, so it always sees a
//! consistent snapshot even when a delete commits mid-flight.

use crate::error::{MatchError, Result};
use crate::table::{Row, Table, TableSummary};
use serde::Serialize;
use std::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

/// One page of a table, as returned by `get_page`.
#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

/// Full result set of a substring search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHits {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total: usize,
}

/// Registry of ingested tables, insertion-ordered.
#[derive(Debug, Default)]
pub struct TableStore {
    tables: RwLock<Vec<Table>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Vec::new()),
        }
    }

    /// Register a parsed table. Names are unique at any instant; a second
    /// registration under the same name fails with `DuplicateTable`.
    pub fn register(&self, table: Table) -> Result<TableSummary> {
        let mut tables = self.write_guard();
        if tables.iter().any(|t| t.name == table.name) {
            return Err(MatchError::DuplicateTable(table.name));
        }
        let summary = table.summary();
        info!(
            table = %summary.name,
            rows = summary.row_count,
            columns = summary.columns.len(),
            "registered table"
        );
        tables.push(table);
        Ok(summary)
    }

    /// Snapshot of current tables in insertion order.
    pub fn list(&self) -> Vec<TableSummary> {
        self.read_guard().iter().map(|t| t.summary()).collect()
    }

    /// One 1-indexed page of a table, clipped to the row count.
    pub fn get_page(&self, name: &str, page: usize, page_size: usize) -> Result<TablePage> {
        if page < 1 {
            return Err(MatchError::InvalidArgument(
                "page must be >= 1".to_string(),
            ));
        }
        if page_size < 1 {
            return Err(MatchError::InvalidArgument(
                "page_size must be >= 1".to_string(),
            ));
        }

        let tables = self.read_guard();
        let table = find(&tables, name)?;
        let total = table.rows.len();
        let start = (page - 1).saturating_mul(page_size).min(total);
        let end = start.saturating_add(page_size).min(total);

        Ok(TablePage {
            columns: table.columns.clone(),
            rows: table.rows[start..end].to_vec(),
            page,
            page_size,
            total,
        })
    }

    /// Case-insensitive substring search. With `column` given the match is
    /// restricted to that column's display form, otherwise any column may
    /// match. An empty term is no filter and returns all rows.
    pub fn search(&self, name: &str, term: &str, column: Option<&str>) -> Result<SearchHits> {
        let tables = self.read_guard();
        let table = find(&tables, name)?;
        if let Some(col) = column {
            table.require_column(col)?;
        }

        let needle = term.to_lowercase();
        let rows: Vec<Row> = table
            .rows
            .iter()
            .filter(|row| {
                if needle.is_empty() {
                    return true;
                }
                match column {
                    Some(col) => cell_contains(row, col, &needle),
                    None => table.columns.iter().any(|col| cell_contains(row, col, &needle)),
                }
            })
            .cloned()
            .collect();

        debug!(table = name, term, hits = rows.len(), "search complete");
        Ok(SearchHits {
            columns: table.columns.clone(),
            total: rows.len(),
            rows,
        })
    }

    /// Remove a table. An unknown name is always an error, including on a
    /// repeated delete.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut tables = self.write_guard();
        let pos = tables
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| MatchError::TableNotFound(name.to_string()))?;
        tables.remove(pos);
        info!(table = name, "deleted table");
        Ok(())
    }

    /// Acquire a read snapshot for a multi-table operation. The guard pins
    /// a consistent view: no registration or deletion can commit while it
    /// is held.
    pub fn read(&self) -> StoreSnapshot<'_> {
        StoreSnapshot {
            tables: self.read_guard(),
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, Vec<Table>> {
        self.tables.read().expect("table store lock poisoned")
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Table>> {
        self.tables.write().expect("table store lock poisoned")
    }
}

/// Read guard over the whole store, resolving tables by name.
pub struct StoreSnapshot<'a> {
    tables: RwLockReadGuard<'a, Vec<Table>>,
}

impl StoreSnapshot<'_> {
    pub fn get(&self, name: &str) -> Result<&Table> {
        find(&self.tables, name)
    }
}

fn find<'a>(tables: &'a [Table], name: &str) -> Result<&'a Table> {
    tables
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| MatchError::TableNotFound(name.to_string()))
}

fn cell_contains(row: &Row, column: &str, needle: &str) -> bool {
    row.get(column)
        .map(|v| v.display().to_lowercase().contains(needle))
        .unwrap_or(false)
}
