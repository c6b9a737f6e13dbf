//! Serialisation of [`Table`]s to CSV and Parquet.
//!
//! Parquet goes through an in-memory DuckDB connection: the table is loaded
//! into a typed staging table and `COPY`-ed out, or read back with
//! `read_parquet`. DuckDB only talks to files, so both directions use a
//! scratch directory.

use crate::error::{EtlError, Result};
use crate::models::{Cell, Table};
use duckdb::{Connection, params_from_iter};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
        }
    }

    /// Format of a stored object, judged by its key. Anything that is not
    /// `.parquet` is read as CSV.
    pub fn for_key(key: &str) -> Self {
        if key.to_ascii_lowercase().ends_with(".parquet") {
            FileFormat::Parquet
        } else {
            FileFormat::Csv
        }
    }
}

impl FromStr for FileFormat {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "parquet" => Ok(FileFormat::Parquet),
            _ => Err(EtlError::UnsupportedOutputFormat(s.to_string())),
        }
    }
}

pub fn encode(table: &Table, format: FileFormat) -> Result<Vec<u8>> {
    match format {
        FileFormat::Csv => encode_csv(table),
        FileFormat::Parquet => encode_parquet(table),
    }
}

pub fn decode(bytes: &[u8], format: FileFormat) -> Result<Table> {
    match format {
        FileFormat::Csv => decode_csv(bytes),
        FileFormat::Parquet => decode_parquet(bytes),
    }
}

// ── CSV ───────────────────────────────────────────────────────────────────────

fn encode_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|c| c.to_text().unwrap_or_default()))?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::Io(e.into_error()))
}

fn decode_csv(bytes: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut table = Table::new(columns);
    let width = table.columns.len();

    for record in reader.records() {
        let record = record?;
        let mut row: Vec<Cell> = record
            .iter()
            .take(width)
            .map(|field| {
                if field.is_empty() {
                    Cell::Null
                } else {
                    Cell::Text(field.to_string())
                }
            })
            .collect();
        row.resize(width, Cell::Null);
        table.rows.push(row);
    }

    Ok(table)
}

// ── Parquet ───────────────────────────────────────────────────────────────────

fn encode_parquet(table: &Table) -> Result<Vec<u8>> {
    let conn = Connection::open_in_memory()?;

    let types: Vec<&'static str> = (0..table.columns.len())
        .map(|i| column_sql_type(table, i))
        .collect();

    let ddl = format!(
        "CREATE TABLE staging ({})",
        table
            .columns
            .iter()
            .zip(&types)
            .map(|(c, t)| format!("{} {}", quote_ident(c), t))
            .collect::<Vec<_>>()
            .join(", ")
    );
    conn.execute_batch(&ddl)?;

    let placeholders = types
        .iter()
        .map(|t| format!("CAST(CAST(? AS VARCHAR) AS {})", t))
        .collect::<Vec<_>>()
        .join(", ");

    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&format!("INSERT INTO staging VALUES ({})", placeholders))?;
        for row in &table.rows {
            stmt.execute(params_from_iter(row.iter().map(Cell::to_text)))?;
        }
    }
    tx.commit()?;

    let scratch = tempfile::tempdir()?;
    let path = scratch.path().join("table.parquet");
    conn.execute_batch(&format!(
        "COPY staging TO {} (FORMAT PARQUET)",
        quote_literal(&path)
    ))?;

    let bytes = std::fs::read(&path)?;
    debug!("Encoded {} rows to {} parquet bytes", table.len(), bytes.len());
    Ok(bytes)
}

fn decode_parquet(bytes: &[u8]) -> Result<Table> {
    let scratch = tempfile::tempdir()?;
    let path = scratch.path().join("table.parquet");
    std::fs::write(&path, bytes)?;

    let conn = Connection::open_in_memory()?;
    conn.execute_batch(&format!(
        "CREATE TABLE source AS SELECT * FROM read_parquet({})",
        quote_literal(&path)
    ))?;

    let columns: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT column_name FROM information_schema.columns
             WHERE table_name = 'source' ORDER BY ordinal_position",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        names
    };

    let mut table = Table::new(columns);
    if table.columns.is_empty() {
        return Ok(table);
    }

    let select = table
        .columns
        .iter()
        .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let width = table.columns.len();

    let mut stmt = conn.prepare(&format!("SELECT {} FROM source", select))?;
    let rows = stmt
        .query_map([], |r| {
            (0..width)
                .map(|i| r.get::<_, Option<String>>(i))
                .collect::<std::result::Result<Vec<_>, _>>()
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    table.rows = rows
        .into_iter()
        .map(|row| row.into_iter().map(|v| v.map(Cell::Text).unwrap_or(Cell::Null)).collect())
        .collect();

    Ok(table)
}

/// DuckDB type for a column: the type of its non-null cells when they all
/// agree, VARCHAR otherwise.
fn column_sql_type(table: &Table, idx: usize) -> &'static str {
    let mut kind: Option<&'static str> = None;
    for cell in table.rows.iter().filter_map(|r| r.get(idx)) {
        if cell.is_null() {
            continue;
        }
        let this = match cell {
            Cell::Float(_) => "DOUBLE",
            Cell::Date(_) => "DATE",
            Cell::DateTime(_) => "TIMESTAMP",
            Cell::Text(_) | Cell::Null => "VARCHAR",
        };
        match kind {
            None => kind = Some(this),
            Some(k) if k != this => return "VARCHAR",
            Some(_) => {}
        }
    }
    kind.unwrap_or("VARCHAR")
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "''"))
}
