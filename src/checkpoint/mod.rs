//! Append-only log of processed source dates (the "meta file").
//!
//! The stored form is a CSV with exactly two columns: the source date
//! (`YYYY-MM-DD`) and the time of the run that covered it
//! (`YYYY-MM-DD HH:MM:SS`). Entries are never deduplicated; a reprocessed
//! date simply shows up again.

use crate::config::CheckpointConfig;
use crate::error::{EtlError, Result};
use crate::models::{Cell, CheckpointEntry, Table};
use crate::storage::BlobStore;
use crate::storage::codec::{self, FileFormat};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use tracing::{debug, info};

pub const SOURCE_DATE_FORMAT: &str = "%Y-%m-%d";
pub const PROCESSED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Outcome of looking up the checkpoint log. Absence is an ordinary state.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointState {
    Found(CheckpointLog),
    NotFound,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointLog {
    entries: Vec<CheckpointEntry>,
}

impl CheckpointLog {
    #[cfg(test)]
    pub fn new(entries: Vec<CheckpointEntry>) -> Self {
        Self { entries }
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[CheckpointEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Distinct source dates recorded in the log.
    pub fn processed_dates(&self) -> BTreeSet<NaiveDate> {
        self.entries.iter().map(|e| e.source_date).collect()
    }

    pub fn last_processed_at(&self) -> Option<NaiveDateTime> {
        self.entries.iter().map(|e| e.processed_at).max()
    }

    /// Parse a stored log. The column set must be exactly the configured
    /// pair (in either order); anything else is rejected whole.
    pub fn from_table(table: &Table, cfg: &CheckpointConfig) -> Result<Self> {
        let expected = [cfg.source_date_col.clone(), cfg.processed_at_col.clone()];

        let mut found_sorted = table.columns.clone();
        found_sorted.sort();
        let mut expected_sorted = expected.to_vec();
        expected_sorted.sort();

        if found_sorted != expected_sorted {
            return Err(EtlError::MalformedCheckpoint {
                key: cfg.key.clone(),
                expected: expected.to_vec(),
                found: table.columns.clone(),
            });
        }

        // Both lookups succeed once the column sets match.
        let date_idx = table.column_index(&cfg.source_date_col).unwrap_or(0);
        let at_idx = table.column_index(&cfg.processed_at_col).unwrap_or(1);

        let entries = table
            .rows
            .iter()
            .map(|row| {
                Ok(CheckpointEntry {
                    source_date: parse_source_date(&row[date_idx], &cfg.source_date_col)?,
                    processed_at: parse_processed_at(&row[at_idx], &cfg.processed_at_col)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries })
    }

    pub fn to_table(&self, cfg: &CheckpointConfig) -> Table {
        Table {
            columns: vec![cfg.source_date_col.clone(), cfg.processed_at_col.clone()],
            rows: self
                .entries
                .iter()
                .map(|e| {
                    vec![Cell::Date(e.source_date), Cell::DateTime(e.processed_at)]
                })
                .collect(),
        }
    }
}

fn parse_source_date(cell: &Cell, column: &str) -> Result<NaiveDate> {
    let raw = cell.to_text().unwrap_or_default();
    NaiveDate::parse_from_str(raw.trim(), SOURCE_DATE_FORMAT).map_err(|_| EtlError::InvalidValue {
        column: column.to_string(),
        value: raw,
    })
}

fn parse_processed_at(cell: &Cell, column: &str) -> Result<NaiveDateTime> {
    let raw = cell.to_text().unwrap_or_default();
    NaiveDateTime::parse_from_str(raw.trim(), PROCESSED_AT_FORMAT).map_err(|_| {
        EtlError::InvalidValue {
            column: column.to_string(),
            value: raw,
        }
    })
}

/// Add one batch of processed dates, all stamped with the same `now`.
/// Old entries come first and are kept untouched.
pub fn append(
    state: CheckpointState,
    new_dates: &[NaiveDate],
    now: NaiveDateTime,
) -> CheckpointLog {
    let mut log = match state {
        CheckpointState::Found(log) => log,
        CheckpointState::NotFound => CheckpointLog::default(),
    };
    log.entries.extend(new_dates.iter().map(|d| CheckpointEntry {
        source_date: *d,
        processed_at: now,
    }));
    log
}

/// The log is always stored as CSV, whatever extension the key carries.
pub fn read_checkpoint(store: &dyn BlobStore, cfg: &CheckpointConfig) -> Result<CheckpointState> {
    match store.get(&cfg.key)? {
        Some(bytes) => {
            let table = codec::decode(&bytes, FileFormat::Csv)?;
            let log = CheckpointLog::from_table(&table, cfg)?;
            debug!("Checkpoint {}: {} entries", cfg.key, log.len());
            Ok(CheckpointState::Found(log))
        }
        None => {
            info!("No checkpoint log at {}, starting from scratch", store.location(&cfg.key));
            Ok(CheckpointState::NotFound)
        }
    }
}

pub fn write_checkpoint(
    store: &dyn BlobStore,
    log: &CheckpointLog,
    cfg: &CheckpointConfig,
) -> Result<()> {
    store.write_table(&log.to_table(cfg), &cfg.key, FileFormat::Csv)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, SOURCE_DATE_FORMAT).unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, PROCESSED_AT_FORMAT).unwrap()
    }

    #[test]
    fn test_append_to_absent_log() {
        let now = ts("2021-04-18 10:00:00");
        let dates = vec![d("2021-04-16"), d("2021-04-17")];
        let log = append(CheckpointState::NotFound, &dates, now);

        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].source_date, d("2021-04-16"));
        assert_eq!(log.entries()[1].source_date, d("2021-04-17"));
        assert!(log.entries().iter().all(|e| e.processed_at == now));
    }

    #[test]
    fn test_append_keeps_old_rows_and_duplicates() {
        let old = CheckpointLog::new(vec![CheckpointEntry {
            source_date: d("2021-04-16"),
            processed_at: ts("2021-04-17 08:00:00"),
        }]);
        let now = ts("2021-04-18 10:00:00");
        let log = append(CheckpointState::Found(old), &[d("2021-04-16"), d("2021-04-17")], now);

        assert_eq!(log.len(), 3);
        assert_eq!(log.entries()[0].processed_at, ts("2021-04-17 08:00:00"));
        assert_eq!(log.entries()[1].source_date, d("2021-04-16"));
        assert_eq!(log.processed_dates().len(), 2);
        assert_eq!(log.last_processed_at(), Some(now));
    }

    #[test]
    fn test_round_trip_through_store() {
        let store = MemoryBlobStore::new();
        let cfg = CheckpointConfig::default();
        let now = ts("2021-04-18 10:00:00");
        let dates = vec![d("2021-04-16"), d("2021-04-17"), d("2021-04-15")];

        let log = append(read_checkpoint(&store, &cfg).unwrap(), &dates, now);
        write_checkpoint(&store, &log, &cfg).unwrap();

        let raw = String::from_utf8(store.get(&cfg.key).unwrap().unwrap()).unwrap();
        assert!(raw.starts_with("source_file_date,datetime_of_processing\n"));
        assert!(raw.contains("2021-04-16,2021-04-18 10:00:00"));

        match read_checkpoint(&store, &cfg).unwrap() {
            CheckpointState::Found(log) => {
                let got: Vec<NaiveDate> = log.entries().iter().map(|e| e.source_date).collect();
                assert_eq!(got, dates);
                assert!(log.entries().iter().all(|e| e.processed_at == now));
            }
            CheckpointState::NotFound => panic!("checkpoint should exist"),
        }
    }

    #[test]
    fn test_parquet_named_key_still_round_trips() {
        let store = MemoryBlobStore::new();
        let cfg = CheckpointConfig {
            key: "meta/report1/meta.parquet".into(),
            ..CheckpointConfig::default()
        };
        let now = ts("2021-04-18 10:00:00");

        let log = append(CheckpointState::NotFound, &[d("2021-04-16")], now);
        write_checkpoint(&store, &log, &cfg).unwrap();

        match read_checkpoint(&store, &cfg).unwrap() {
            CheckpointState::Found(log) => {
                assert_eq!(log.len(), 1);
                assert_eq!(log.entries()[0].source_date, d("2021-04-16"));
            }
            CheckpointState::NotFound => panic!("checkpoint should exist"),
        }
    }

    #[test]
    fn test_missing_log_is_not_found() {
        let store = MemoryBlobStore::new();
        let state = read_checkpoint(&store, &CheckpointConfig::default()).unwrap();
        assert_eq!(state, CheckpointState::NotFound);
    }

    #[test]
    fn test_wrong_columns_rejected() {
        let store = MemoryBlobStore::new();
        let cfg = CheckpointConfig::default();
        store
            .put(&cfg.key, b"wrong_column,datetime_of_processing\n2021-04-16,2021-04-18 10:00:00\n")
            .unwrap();

        match read_checkpoint(&store, &cfg) {
            Err(EtlError::MalformedCheckpoint { found, .. }) => {
                assert_eq!(found, vec!["wrong_column", "datetime_of_processing"]);
            }
            other => panic!("expected malformed checkpoint, got {:?}", other),
        }
    }

    #[test]
    fn test_extra_column_rejected() {
        let cfg = CheckpointConfig::default();
        let table = Table::new(vec![
            cfg.source_date_col.clone(),
            cfg.processed_at_col.clone(),
            "note".into(),
        ]);
        assert!(matches!(
            CheckpointLog::from_table(&table, &cfg),
            Err(EtlError::MalformedCheckpoint { .. })
        ));
    }

    #[test]
    fn test_swapped_column_order_accepted() {
        let cfg = CheckpointConfig::default();
        let table = Table {
            columns: vec![cfg.processed_at_col.clone(), cfg.source_date_col.clone()],
            rows: vec![vec![
                Cell::Text("2021-04-18 10:00:00".into()),
                Cell::Text("2021-04-16".into()),
            ]],
        };
        let log = CheckpointLog::from_table(&table, &cfg).unwrap();
        assert_eq!(log.entries()[0].source_date, d("2021-04-16"));
    }
}
