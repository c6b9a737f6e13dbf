use thiserror::Error;

/// Errors raised by the ETL core. All of them are fatal for the current run.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Malformed checkpoint log {key}: expected columns {expected:?}, found {found:?}")]
    MalformedCheckpoint {
        key: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Unsupported output format: {0:?} (expected \"csv\" or \"parquet\")")]
    UnsupportedOutputFormat(String),

    #[error("Column {column:?} missing from source table (have {available:?})")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Invalid date {value:?}, expected format {format}")]
    InvalidDate { value: String, format: &'static str },

    #[error("Invalid value {value:?} in column {column:?}")]
    InvalidValue { column: String, value: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;
