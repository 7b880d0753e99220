//! Join engine - equality matching across in-memory tables
//!
//! One generalized execution path serves both public variants. Each target
//! gets a hash index from join-key form to row positions over its match
//! column; every source row is then probed in ingestion order, candidates
//! are narrowed by the target's secondary conditions, and the survivors
//! feed the projector.
//!
//! The two variants pin different, documented policies on top:
//!
//! - `single_match` is an inner join: a source row with zero candidates is
//!   dropped. A key with several candidates suspends the whole call with
//!   an `AmbiguityReport` unless `Selections` are supplied.
//! - `multi_match` is a left join: every source row is emitted and a
//!   target with zero candidates contributes nulls. Several candidates
//!   never prompt; the first in table order wins.

use crate::ambiguity::{choose_candidate, AmbiguityReport, Selections};
use crate::error::{MatchError, Result};
use crate::project::ResultProjector;
use crate::table::{Row, Table};
use crate::value::CellValue;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Secondary equality constraint: the source row's value at
/// `source_column` must loose-equal the candidate row's value at
/// `target_column`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinCondition {
    pub source_column: String,
    pub target_column: String,
}

/// One target table of a match request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub target_table: String,
    pub target_match_column: String,
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<JoinCondition>,
}

/// Row-emission policy when a target has no candidate for a source row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// Drop the source row unless every target produced a candidate.
    Inner,
    /// Emit every source row; missing candidates fill with nulls.
    Left,
}

/// A completed join.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub source_table: String,
    pub target_tables: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total: usize,
}

/// Outcome of the single-target variant: either a result or a request for
/// the second protocol phase.
#[derive(Debug)]
pub enum MatchOutcome {
    Complete(MatchResult),
    NeedSelection(AmbiguityReport),
}

/// A target table with its lookup index, built once per request.
struct TargetIndex<'a> {
    table: &'a Table,
    spec: &'a TargetSpec,
    index: HashMap<String, Vec<usize>>,
}

impl<'a> TargetIndex<'a> {
    fn build(source: &Table, table: &'a Table, spec: &'a TargetSpec) -> Result<Self> {
        if spec.target_columns.is_empty() {
            return Err(MatchError::InvalidArgument(format!(
                "target_columns must not be empty for table '{}'",
                table.name
            )));
        }
        table.require_column(&spec.target_match_column)?;
        for col in &spec.target_columns {
            table.require_column(col)?;
        }
        for cond in &spec.conditions {
            source.require_column(&cond.source_column)?;
            table.require_column(&cond.target_column)?;
        }

        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (pos, row) in table.rows.iter().enumerate() {
            if let Some(key) = row
                .get(&spec.target_match_column)
                .and_then(CellValue::join_key)
            {
                index.entry(key).or_default().push(pos);
            }
        }
        debug!(
            table = %table.name,
            match_column = %spec.target_match_column,
            distinct_keys = index.len(),
            "built target index"
        );

        Ok(Self { table, spec, index })
    }

    /// Row positions whose match column equals `key` and whose secondary
    /// conditions all hold against `source_row`, in table order.
    fn candidates(&self, key: &str, source_row: &Row) -> Vec<usize> {
        let Some(positions) = self.index.get(key) else {
            return Vec::new();
        };
        positions
            .iter()
            .copied()
            .filter(|&pos| {
                let candidate = &self.table.rows[pos];
                self.spec.conditions.iter().all(|cond| {
                    match (source_row.get(&cond.source_column), candidate.get(&cond.target_column)) {
                        (Some(a), Some(b)) => a.loose_eq(b),
                        _ => false,
                    }
                })
            })
            .collect()
    }

    fn row(&self, pos: usize) -> &Row {
        &self.table.rows[pos]
    }
}

/// Single-target equality match with the interactive ambiguity protocol.
///
/// Without `selections`, a first pass reports every key with two or more
/// candidates; with `selections` (the retry), the call always completes
/// and unresolved keys take candidate 0.
pub fn single_match(
    source: &Table,
    source_column: &str,
    target: &Table,
    spec: &TargetSpec,
    selections: Option<&Selections>,
) -> Result<MatchOutcome> {
    source.require_column(source_column)?;
    let index = TargetIndex::build(source, target, spec)?;

    if selections.is_none() {
        let report = detect_ambiguities(source, source_column, &index);
        if !report.is_empty() {
            debug!(
                source = %source.name,
                target_table = %target.name,
                ambiguous_keys = report.key_count(),
                "match suspended for selection"
            );
            return Ok(MatchOutcome::NeedSelection(report));
        }
    }

    let result = execute(
        source,
        source_column,
        &[index],
        JoinMode::Inner,
        selections,
    );
    Ok(MatchOutcome::Complete(result))
}

/// Multi-target equality match: left join against each target
/// independently, first candidate in table order on multiplicity.
pub fn multi_match(
    source: &Table,
    source_column: &str,
    targets: &[(&Table, &TargetSpec)],
) -> Result<MatchResult> {
    if targets.is_empty() {
        return Err(MatchError::InvalidArgument(
            "targets must not be empty".to_string(),
        ));
    }
    source.require_column(source_column)?;

    let indexes = targets
        .iter()
        .map(|(table, spec)| TargetIndex::build(source, table, spec))
        .collect::<Result<Vec<_>>>()?;

    Ok(execute(source, source_column, &indexes, JoinMode::Left, None))
}

/// Keys whose candidate set (after conditions) holds two or more rows -
/// all of them and only them, with candidates in table order.
fn detect_ambiguities(source: &Table, source_column: &str, index: &TargetIndex) -> AmbiguityReport {
    let mut report = AmbiguityReport::new();
    for row in &source.rows {
        let Some(key) = row.get(source_column).and_then(CellValue::join_key) else {
            continue;
        };
        let candidates = index.candidates(&key, row);
        if candidates.len() > 1 {
            report.record(
                &key,
                candidates.iter().map(|&pos| index.row(pos).clone()).collect(),
            );
        }
    }
    report
}

fn execute(
    source: &Table,
    source_column: &str,
    indexes: &[TargetIndex],
    mode: JoinMode,
    selections: Option<&Selections>,
) -> MatchResult {
    let projection_targets: Vec<(&str, &[String])> = indexes
        .iter()
        .map(|t| (t.table.name.as_str(), t.spec.target_columns.as_slice()))
        .collect();
    let projector = ResultProjector::new(source_column, &projection_targets);

    let mut rows = Vec::new();
    for source_row in &source.rows {
        let key = source_row.get(source_column).and_then(CellValue::join_key);

        let picks: Vec<Option<&Row>> = indexes
            .iter()
            .map(|target| {
                let candidates = match &key {
                    Some(k) => target.candidates(k, source_row),
                    None => Vec::new(),
                };
                match candidates.len() {
                    0 => None,
                    1 => Some(target.row(candidates[0])),
                    n => {
                        let chosen =
                            choose_candidate(selections, key.as_deref().unwrap_or(""), n);
                        Some(target.row(candidates[chosen]))
                    }
                }
            })
            .collect();

        if mode == JoinMode::Inner && picks.iter().any(Option::is_none) {
            continue;
        }

        let key_value = source_row
            .get(source_column)
            .cloned()
            .unwrap_or(CellValue::Null);
        rows.push(projector.assemble_row(&key_value, &picks));
    }

    debug!(
        source = %source.name,
        targets = %indexes.iter().map(|t| t.table.name.as_str()).join(","),
        emitted = rows.len(),
        "join complete"
    );

    MatchResult {
        source_table: source.name.clone(),
        target_tables: indexes.iter().map(|t| t.table.name.clone()).collect(),
        columns: projector.columns(),
        total: rows.len(),
        rows,
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

    fn orders() -> Table {
        Table::new(
            "Orders",
            vec!["OrderID".to_string(), "CustomerID".to_string()],
            vec![
                row(&[("OrderID", CellValue::from(1)), ("CustomerID", CellValue::from("C1"))]),
                row(&[("OrderID", CellValue::from(2)), ("CustomerID", CellValue::from("C2"))]),
            ],
        )
        .unwrap()
    }

    fn customers(rows: &[(&str, &str, &str)]) -> Table {
        Table::new(
            "Customers",
            vec!["CustomerID".to_string(), "Name".to_string(), "City".to_string()],
            rows.iter()
                .map(|(id, name, city)| {
                    row(&[
                        ("CustomerID", CellValue::from(*id)),
                        ("Name", CellValue::from(*name)),
                        ("City", CellValue::from(*city)),
                    ])
                })
                .collect(),
        )
        .unwrap()
    }

    fn customer_spec() -> TargetSpec {
        TargetSpec {
            target_table: "Customers".to_string(),
            target_match_column: "CustomerID".to_string(),
            target_columns: vec!["Name".to_string(), "City".to_string()],
            conditions: vec![],
        }
    }

    #[test]
    fn test_unique_keys_match_without_ambiguity() {
        let source = orders();
        let target = customers(&[("C1", "Alice", "NY"), ("C2", "Bob", "LA")]);
        let outcome =
            single_match(&source, "CustomerID", &target, &customer_spec(), None).unwrap();

        let MatchOutcome::Complete(result) = outcome else {
            panic!("unique keys must not report ambiguity");
        };
        assert_eq!(result.total, 2);
        assert_eq!(result.columns, vec!["CustomerID", "Name", "City"]);
        assert_eq!(result.rows[0]["Name"], CellValue::from("Alice"));
        assert_eq!(result.rows[1]["City"], CellValue::from("LA"));
    }

    #[test]
    fn test_inner_join_drops_unmatched_source_rows() {
        let source = orders();
        let target = customers(&[("C1", "Alice", "NY")]);
        let outcome =
            single_match(&source, "CustomerID", &target, &customer_spec(), None).unwrap();

        let MatchOutcome::Complete(result) = outcome else {
            panic!("expected a completed match");
        };
        assert_eq!(result.total, 1);
        assert_eq!(result.rows[0]["CustomerID"], CellValue::from("C1"));
    }

    #[test]
    fn test_duplicate_key_suspends_for_selection() {
        let source = orders();
        let target = customers(&[("C1", "Alice", "NY"), ("C1", "Alicia", "SF"), ("C2", "Bob", "LA")]);
        let outcome =
            single_match(&source, "CustomerID", &target, &customer_spec(), None).unwrap();

        let MatchOutcome::NeedSelection(report) = outcome else {
            panic!("duplicate key must suspend");
        };
        assert_eq!(report.key_count(), 1);
        let candidates = &report.multi_value_keys["C1"];
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0]["Name"], CellValue::from("Alice"));
        assert_eq!(candidates[1]["Name"], CellValue::from("Alicia"));
    }

    #[test]
    fn test_retry_applies_selections_and_defaults() {
        let source = orders();
        let target = customers(&[("C1", "Alice", "NY"), ("C1", "Alicia", "SF"), ("C2", "Bob", "LA")]);

        let mut selections = Selections::new();
        selections.insert("C1".to_string(), 1);
        let outcome = single_match(
            &source,
            "CustomerID",
            &target,
            &customer_spec(),
            Some(&selections),
        )
        .unwrap();
        let MatchOutcome::Complete(result) = outcome else {
            panic!("retry must always complete");
        };
        assert_eq!(result.rows[0]["Name"], CellValue::from("Alicia"));

        // An empty selection map still completes, taking candidate 0.
        let outcome = single_match(
            &source,
            "CustomerID",
            &target,
            &customer_spec(),
            Some(&Selections::new()),
        )
        .unwrap();
        let MatchOutcome::Complete(result) = outcome else {
            panic!("retry must always complete");
        };
        assert_eq!(result.rows[0]["Name"], CellValue::from("Alice"));
    }

    #[test]
    fn test_multi_match_left_fills_missing_targets() {
        let source = orders();
        let target = customers(&[("C1", "Alice", "NY")]);
        let spec = customer_spec();
        let result = multi_match(&source, "CustomerID", &[(&target, &spec)]).unwrap();

        // Every source row is emitted; the miss fills with nulls.
        assert_eq!(result.total, 2);
        assert_eq!(result.rows[1]["CustomerID"], CellValue::from("C2"));
        assert_eq!(result.rows[1]["Name"], CellValue::Null);
    }

    #[test]
    fn test_multi_match_takes_first_candidate() {
        let source = orders();
        let target = customers(&[("C1", "Alice", "NY"), ("C1", "Alicia", "SF")]);
        let spec = customer_spec();
        let result = multi_match(&source, "CustomerID", &[(&target, &spec)]).unwrap();
        assert_eq!(result.rows[0]["Name"], CellValue::from("Alice"));
    }

    #[test]
    fn test_conditions_narrow_candidates() {
        let source = Table::new(
            "lines",
            vec!["sku".to_string(), "region".to_string()],
            vec![row(&[
                ("sku", CellValue::from("S1")),
                ("region", CellValue::from("EU")),
            ])],
        )
        .unwrap();
        let target = Table::new(
            "prices",
            vec!["sku".to_string(), "region".to_string(), "price".to_string()],
            vec![
                row(&[
                    ("sku", CellValue::from("S1")),
                    ("region", CellValue::from("US")),
                    ("price", CellValue::from(10)),
                ]),
                row(&[
                    ("sku", CellValue::from("S1")),
                    ("region", CellValue::from("EU")),
                    ("price", CellValue::from(12)),
                ]),
            ],
        )
        .unwrap();
        let spec = TargetSpec {
            target_table: "prices".to_string(),
            target_match_column: "sku".to_string(),
            target_columns: vec!["price".to_string()],
            conditions: vec![JoinCondition {
                source_column: "region".to_string(),
                target_column: "region".to_string(),
            }],
        };

        let result = multi_match(&source, "sku", &[(&target, &spec)]).unwrap();
        assert_eq!(result.rows[0]["price"], CellValue::from(12));

        // Without conditions the join reduces to plain key equality and the
        // first candidate wins.
        let plain = TargetSpec {
            conditions: vec![],
            ..spec
        };
        let result = multi_match(&source, "sku", &[(&target, &plain)]).unwrap();
        assert_eq!(result.rows[0]["price"], CellValue::from(10));
    }

    #[test]
    fn test_null_source_key_never_matches() {
        let source = Table::new(
            "src",
            vec!["k".to_string()],
            vec![row(&[("k", CellValue::Null)]), row(&[("k", CellValue::from("a"))])],
        )
        .unwrap();
        let target = Table::new(
            "tgt",
            vec!["k".to_string(), "v".to_string()],
            vec![
                row(&[("k", CellValue::Null), ("v", CellValue::from("null row"))]),
                row(&[("k", CellValue::from("a")), ("v", CellValue::from("hit"))]),
            ],
        )
        .unwrap();
        let spec = TargetSpec {
            target_table: "tgt".to_string(),
            target_match_column: "k".to_string(),
            target_columns: vec!["v".to_string()],
            conditions: vec![],
        };

        let outcome = single_match(&source, "k", &target, &spec, None).unwrap();
        let MatchOutcome::Complete(result) = outcome else {
            panic!("null keys are not ambiguous");
        };
        assert_eq!(result.total, 1);
        assert_eq!(result.rows[0]["v"], CellValue::from("hit"));

        let result = multi_match(&source, "k", &[(&target, &spec)]).unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.rows[0]["v"], CellValue::Null);
    }

    #[test]
    fn test_numeric_and_string_keys_coerce() {
        let source = Table::new(
            "src",
            vec!["k".to_string()],
            vec![row(&[("k", CellValue::from(42))])],
        )
        .unwrap();
        let target = Table::new(
            "tgt",
            vec!["k".to_string(), "v".to_string()],
            vec![row(&[("k", CellValue::from("42")), ("v", CellValue::from("hit"))])],
        )
        .unwrap();
        let spec = TargetSpec {
            target_table: "tgt".to_string(),
            target_match_column: "k".to_string(),
            target_columns: vec!["v".to_string()],
            conditions: vec![],
        };

        let result = multi_match(&source, "k", &[(&target, &spec)]).unwrap();
        assert_eq!(result.rows[0]["v"], CellValue::from("hit"));
    }

    #[test]
    fn test_validation_errors() {
        let source = orders();
        let target = customers(&[("C1", "Alice", "NY")]);

        let empty_cols = TargetSpec {
            target_table: "Customers".to_string(),
            target_match_column: "CustomerID".to_string(),
            target_columns: vec![],
            conditions: vec![],
        };
        assert!(matches!(
            single_match(&source, "CustomerID", &target, &empty_cols, None),
            Err(MatchError::InvalidArgument(_))
        ));

        let bad_col = TargetSpec {
            target_columns: vec!["Missing".to_string()],
            ..customer_spec()
        };
        assert!(matches!(
            single_match(&source, "CustomerID", &target, &bad_col, None),
            Err(MatchError::ColumnNotFound { .. })
        ));

        assert!(matches!(
            single_match(&source, "Missing", &target, &customer_spec(), None),
            Err(MatchError::ColumnNotFound { .. })
        ));

        assert!(matches!(
            multi_match(&source, "CustomerID", &[]),
            Err(MatchError::InvalidArgument(_))
        ));
    }
}
