//! Tables - named, column-ordered row sets as produced by ingestion

use crate::error::{MatchError, Result};
use crate::value::CellValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single row, keyed by column name. Invariant: the key set is exactly
/// the owning table's column set; missing cells are `Null`, never absent.
pub type Row = HashMap<String, CellValue>;

/// An ingested table. Immutable once registered; column order is
/// ingestion order and is preserved everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Listing entry for a registered table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl Table {
    /// Build a table from parsed data, normalizing every row to the column
    /// set: missing cells become `Null`, keys outside the column list are
    /// dropped.
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MatchError::InvalidArgument(
                "table name must not be empty".to_string(),
            ));
        }
        if columns.is_empty() {
            return Err(MatchError::InvalidArgument(format!(
                "table '{}' must have at least one column",
                name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for col in &columns {
            if !seen.insert(col.as_str()) {
                return Err(MatchError::InvalidArgument(format!(
                    "table '{}' has duplicate column '{}'",
                    name, col
                )));
            }
        }

        let rows = rows
            .into_iter()
            .map(|mut raw| {
                columns
                    .iter()
                    .map(|col| {
                        let value = raw.remove(col).unwrap_or(CellValue::Null);
                        (col.clone(), value)
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            name,
            columns,
            rows,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Fail with `ColumnNotFound` unless the column exists.
    pub fn require_column(&self, column: &str) -> Result<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(MatchError::ColumnNotFound {
                table: self.name.clone(),
                column: column.to_string(),
            })
        }
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            name: self.name.clone(),
            row_count: self.rows.len(),
            columns: self.columns.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_rows_normalized_to_column_set() {
        let table = Table::new(
            "orders",
            vec!["id".to_string(), "amount".to_string()],
            vec![row(&[
                ("id", CellValue::from(1)),
                ("stray", CellValue::from("x")),
            ])],
        )
        .unwrap();

        let first = &table.rows[0];
        assert_eq!(first.len(), 2);
        assert_eq!(first["amount"], CellValue::Null);
        assert!(!first.contains_key("stray"));
    }

    #[test]
    fn test_empty_column_list_rejected() {
        let err = Table::new("empty", vec![], vec![]).unwrap_err();
        assert!(matches!(err, MatchError::InvalidArgument(_)));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Table::new(
            "dup",
            vec!["id".to_string(), "id".to_string()],
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, MatchError::InvalidArgument(_)));
    }

    #[test]
    fn test_require_column() {
        let table = Table::new("t", vec!["id".to_string()], vec![]).unwrap();
        assert!(table.require_column("id").is_ok());
        assert!(matches!(
            table.require_column("nope"),
            Err(MatchError::ColumnNotFound { .. })
        ));
    }
}
