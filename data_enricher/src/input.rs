use anyhow::{Context, Result};
use duckdb::Connection;
use std::path::Path;

use crate::{
    common::source_expr,
    constants::{CODE_COLUMN, DATE_COLUMN, NAME_COLUMN},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosisRow {
    pub code: String,
    pub entry_date: String,
    pub name: String,
}

/// Reads the first `max_rows` rows in file order. Missing values come back as empty strings.
pub fn read_diagnosis_rows(input_path: &Path, max_rows: usize) -> Result<Vec<DiagnosisRow>> {
    let conn = Connection::open_in_memory().context("Failed opening DuckDB")?;
    let source = source_expr(input_path)?;
    let query = format!(
        "
        SELECT
            COALESCE(CAST({CODE_COLUMN} AS VARCHAR), '') AS code,
            COALESCE(CAST({DATE_COLUMN} AS VARCHAR), '') AS entry_date,
            COALESCE(CAST({NAME_COLUMN} AS VARCHAR), '') AS name
        FROM {source}
        LIMIT {max_rows}
        "
    );

    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed preparing diagnosis query for {}", input_path.display()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DiagnosisRow {
                code: row.get::<usize, String>(0)?,
                entry_date: row.get::<usize, String>(1)?,
                name: row.get::<usize, String>(2)?,
            })
        })
        .context("Failed running diagnosis query")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("Failed reading diagnosis row")?);
    }
    Ok(out)
}
