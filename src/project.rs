//! Result projection - shaping join output columns and rows
//!
//! The output column list is the source key column followed by every
//! target's projected columns in target order. When two contributors share
//! a literal name, the later one is qualified with its owning table name so
//! no two output columns collide.

use crate::table::Row;
use crate::value::CellValue;
use std::collections::HashSet;

/// Maps target-table columns onto a collision-free, ordered output column
/// list and assembles result rows from per-target candidate picks.
#[derive(Debug, Clone)]
pub struct ResultProjector {
    key_column: String,
    /// Per target, (column name in the target row, output column name).
    targets: Vec<Vec<(String, String)>>,
}

impl ResultProjector {
    /// `targets` is, per target in order, the owning table name and the
    /// projected column list.
    pub fn new(key_column: &str, targets: &[(&str, &[String])]) -> Self {
        let mut used: HashSet<String> = HashSet::new();
        used.insert(key_column.to_string());

        let targets = targets
            .iter()
            .map(|(table, columns)| {
                columns
                    .iter()
                    .map(|col| {
                        let mut name = col.clone();
                        if used.contains(&name) {
                            name = format!("{}_{}", col, table);
                        }
                        let mut n = 2;
                        while used.contains(&name) {
                            name = format!("{}_{}_{}", col, table, n);
                            n += 1;
                        }
                        used.insert(name.clone());
                        (col.clone(), name)
                    })
                    .collect()
            })
            .collect();

        Self {
            key_column: key_column.to_string(),
            targets,
        }
    }

    /// Ordered output column names.
    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec![self.key_column.clone()];
        for target in &self.targets {
            columns.extend(target.iter().map(|(_, out)| out.clone()));
        }
        columns
    }

    /// Assemble one output row from the source key value and one optional
    /// candidate row per target. A missing candidate fills that target's
    /// declared columns with `Null`.
    pub fn assemble_row(&self, key_value: &CellValue, picks: &[Option<&Row>]) -> Row {
        let mut out = Row::new();
        out.insert(self.key_column.clone(), key_value.clone());
        for (target, pick) in self.targets.iter().zip(picks) {
            for (col, out_name) in target {
                let value = pick
                    .and_then(|row| row.get(col))
                    .cloned()
                    .unwrap_or(CellValue::Null);
                out.insert(out_name.clone(), value);
            }
        }
        out
    }
}
