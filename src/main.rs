// Import from library crate
use tablematch::ambiguity::Selections;
use tablematch::ingestion;
use tablematch::service::{MatchRequest, MatchService, MultiMatchRequest, SearchRequest};
use tablematch::store::TableStore;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tablematch")]
#[command(about = "In-memory table registry and cross-table match engine")]
#[command(version)]
struct Args {
    /// Directory of CSV files loaded as tables (table name = file stem)
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List loaded tables
    Tables,

    /// Show one page of a table
    Page {
        /// Table name
        table: String,

        /// 1-indexed page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Rows per page
        #[arg(long, default_value_t = 50)]
        page_size: usize,
    },

    /// Search a table for a case-insensitive substring
    Search {
        /// Table name
        table: String,

        /// Search term (empty returns all rows)
        term: String,

        /// Restrict the search to one column
        #[arg(long)]
        column: Option<String>,
    },

    /// Match a source column against one target table
    Match {
        /// Source table name
        source: String,

        /// Source column holding the join key
        source_column: String,

        /// Target table name
        target: String,

        /// Target column compared against the source key
        target_match_column: String,

        /// Target column to project into the result (repeatable)
        #[arg(short = 'c', long = "column", required = true)]
        columns: Vec<String>,

        /// Resolve an ambiguous key: KEY=CANDIDATE_INDEX (repeatable)
        #[arg(long = "select", value_parser = parse_selection)]
        selections: Vec<(String, usize)>,
    },

    /// Run a multi-target match from a JSON request file
    MultiMatch {
        /// Path to a JSON MultiMatchRequest
        #[arg(long)]
        spec: PathBuf,
    },
}

fn parse_selection(s: &str) -> std::result::Result<(String, usize), String> {
    let (key, index) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=INDEX, got '{}'", s))?;
    let index = index
        .parse::<usize>()
        .map_err(|_| format!("candidate index must be a number, got '{}'", index))?;
    Ok((key.to_string(), index))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let store = Arc::new(TableStore::new());
    let service = MatchService::new(store.clone());
    load_data_dir(&store, &args.data_dir)?;

    match args.command {
        Commands::Tables => print_json(&service.list_tables())?,
        Commands::Page {
            table,
            page,
            page_size,
        } => print_json(&service.get_table_page(&table, page, page_size)?)?,
        Commands::Search {
            table,
            term,
            column,
        } => {
            let response = service.search(SearchRequest {
                table_name: table,
                search_term: term,
                search_column: column,
            })?;
            print_json(&response)?;
        }
        Commands::Match {
            source,
            source_column,
            target,
            target_match_column,
            columns,
            selections,
        } => {
            let selections: Option<Selections> = if selections.is_empty() {
                None
            } else {
                Some(selections.into_iter().collect())
            };
            let response = service.match_tables(MatchRequest {
                source_table: source,
                source_column,
                target_table: target,
                target_match_column,
                target_columns: columns,
                selections,
            })?;
            print_json(&response)?;
        }
        Commands::MultiMatch { spec } => {
            let text = std::fs::read_to_string(&spec)
                .with_context(|| format!("failed to read spec file {}", spec.display()))?;
            let request: MultiMatchRequest =
                serde_json::from_str(&text).context("failed to parse multi-match request")?;
            print_json(&service.multi_match(request)?)?;
        }
    }

    Ok(())
}

/// Load every *.csv in the data directory, in filename order so table
/// insertion order is deterministic.
fn load_data_dir(store: &TableStore, dir: &PathBuf) -> Result<()> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read data dir {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("csv"))
        .collect();
    paths.sort();

    for path in &paths {
        let table = ingestion::table_from_csv_path(path)
            .with_context(|| format!("failed to ingest {}", path.display()))?;
        store.register(table)?;
    }
    info!(tables = paths.len(), dir = %dir.display(), "data directory loaded");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
