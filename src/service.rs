//! Service facade - the request/response contract the client drives
//!
//! Thin handler over an `Arc<TableStore>`: validates request fields,
//! resolves tables under one read snapshot, delegates to the join engine
//! and shapes the wire-level payloads. Wire framing (HTTP or otherwise) is
//! the caller's concern.

use crate::ambiguity::Selections;
use crate::error::{MatchError, Result};
use crate::join::{self, MatchOutcome, TargetSpec};
use crate::store::TableStore;
use crate::table::{Row, Table, TableSummary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub table_name: String,
    pub rows: usize,
    pub columns: Vec<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TablePageResponse {
    pub table_name: String,
    pub columns: Vec<String>,
    pub data: Vec<Row>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub table_name: String,
    pub search_term: String,
    #[serde(default)]
    pub search_column: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub table_name: String,
    pub search_term: String,
    pub search_column: Option<String>,
    pub data: Vec<Row>,
    pub total: usize,
}

/// Single-target match request. `selections` is absent on the first call
/// and carries the user's choices on the retry.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchRequest {
    pub source_table: String,
    pub source_column: String,
    pub target_table: String,
    pub target_match_column: String,
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub selections: Option<Selections>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MatchResponse {
    Ok {
        source_table: String,
        target_table: String,
        columns: Vec<String>,
        data: Vec<Row>,
        total: usize,
    },
    NeedSelection {
        message: String,
        multi_value_keys: BTreeMap<String, Vec<Row>>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct MultiMatchRequest {
    pub source_table: String,
    pub source_column: String,
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Serialize)]
pub struct MultiMatchResponse {
    pub source_table: String,
    pub target_tables: Vec<String>,
    pub columns: Vec<String>,
    pub data: Vec<Row>,
    pub total: usize,
}

/// API handler over the shared table store.
pub struct MatchService {
    store: Arc<TableStore>,
}

impl MatchService {
    pub fn new(store: Arc<TableStore>) -> Self {
        Self { store }
    }

    /// Register an already-parsed table. File parsing happens upstream;
    /// the service only receives columns and rows.
    pub fn register_table(
        &self,
        name: &str,
        columns: Vec<String>,
        rows: Vec<Row>,
    ) -> Result<RegisterResponse> {
        let table = Table::new(name, columns, rows)?;
        let summary = self.store.register(table)?;
        Ok(RegisterResponse {
            message: format!("Table '{}' registered", summary.name),
            table_name: summary.name,
            rows: summary.row_count,
            columns: summary.columns,
        })
    }

    pub fn list_tables(&self) -> Vec<TableSummary> {
        self.store.list()
    }

    pub fn get_table_page(
        &self,
        name: &str,
        page: usize,
        page_size: usize,
    ) -> Result<TablePageResponse> {
        let page_data = self.store.get_page(name, page, page_size)?;
        Ok(TablePageResponse {
            table_name: name.to_string(),
            columns: page_data.columns,
            data: page_data.rows,
            page: page_data.page,
            page_size: page_data.page_size,
            total: page_data.total,
        })
    }

    pub fn delete_table(&self, name: &str) -> Result<DeleteResponse> {
        self.store.delete(name)?;
        Ok(DeleteResponse {
            message: format!("Table '{}' deleted", name),
        })
    }

    pub fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        require_field(&request.table_name, "table_name")?;
        let hits = self.store.search(
            &request.table_name,
            &request.search_term,
            request.search_column.as_deref(),
        )?;
        Ok(SearchResponse {
            table_name: request.table_name,
            search_term: request.search_term,
            search_column: request.search_column,
            total: hits.total,
            data: hits.rows,
        })
    }

    /// Single-target match: inner join with the two-phase ambiguity
    /// protocol. The engine holds no state between the two calls; the
    /// caller resubmits the same request plus `selections`.
    pub fn match_tables(&self, request: MatchRequest) -> Result<MatchResponse> {
        require_field(&request.source_table, "source_table")?;
        require_field(&request.source_column, "source_column")?;
        require_field(&request.target_table, "target_table")?;
        require_field(&request.target_match_column, "target_match_column")?;
        if request.target_columns.is_empty() {
            return Err(MatchError::InvalidArgument(
                "missing required field: target_columns".to_string(),
            ));
        }

        info!(
            source = %request.source_table,
            target_table = %request.target_table,
            retry = request.selections.is_some(),
            "match requested"
        );

        let spec = TargetSpec {
            target_table: request.target_table.clone(),
            target_match_column: request.target_match_column.clone(),
            target_columns: request.target_columns.clone(),
            conditions: vec![],
        };

        let snapshot = self.store.read();
        let source = snapshot.get(&request.source_table)?;
        let target = snapshot.get(&request.target_table)?;

        let outcome = join::single_match(
            source,
            &request.source_column,
            target,
            &spec,
            request.selections.as_ref(),
        )?;

        Ok(match outcome {
            MatchOutcome::Complete(result) => MatchResponse::Ok {
                source_table: result.source_table,
                target_table: request.target_table,
                columns: result.columns,
                data: result.rows,
                total: result.total,
            },
            MatchOutcome::NeedSelection(report) => MatchResponse::NeedSelection {
                message: format!(
                    "{} key(s) matched multiple rows; resubmit with selections",
                    report.key_count()
                ),
                multi_value_keys: report.multi_value_keys,
            },
        })
    }

    /// Multi-target match: left join against each target, first candidate
    /// wins on multiplicity. Never interactive.
    pub fn multi_match(&self, request: MultiMatchRequest) -> Result<MultiMatchResponse> {
        require_field(&request.source_table, "source_table")?;
        require_field(&request.source_column, "source_column")?;
        if request.targets.is_empty() {
            return Err(MatchError::InvalidArgument(
                "missing required field: targets".to_string(),
            ));
        }
        for target in &request.targets {
            require_field(&target.target_table, "target_table")?;
            require_field(&target.target_match_column, "target_match_column")?;
        }

        info!(
            source = %request.source_table,
            targets = request.targets.len(),
            "multi-match requested"
        );

        let snapshot = self.store.read();
        let source = snapshot.get(&request.source_table)?;
        let targets = request
            .targets
            .iter()
            .map(|spec| Ok((snapshot.get(&spec.target_table)?, spec)))
            .collect::<Result<Vec<_>>>()?;

        let result = join::multi_match(source, &request.source_column, &targets)?;
        Ok(MultiMatchResponse {
            source_table: result.source_table,
            target_tables: result.target_tables,
            columns: result.columns,
            data: result.rows,
            total: result.total,
        })
    }
}

fn require_field(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(MatchError::InvalidArgument(format!(
            "missing required field: {}",
            name
        )))
    } else {
        Ok(())
    }
}
