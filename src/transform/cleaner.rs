use crate::config::SourceConfig;
use crate::error::{EtlError, Result};
use crate::models::{Cell, RawRecord, Table};
use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};

// ── Parsers ───────────────────────────────────────────────────────────────────

/// Parse a price or volume written as a plain decimal ("20.5", "1e3").
pub fn parse_number(s: &str) -> Option<f64> {
    let value: f64 = s.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// Trading dates are ISO `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Interval start: "08:00" or "08:00:00".
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

// ── Column resolution ─────────────────────────────────────────────────────────

struct SourceIndex {
    projected: Vec<usize>,
    isin: usize,
    date: usize,
    time: usize,
    start_price: usize,
    min_price: usize,
    max_price: usize,
    traded_volume: usize,
}

fn index_of(table: &Table, column: &str) -> Result<usize> {
    table
        .column_index(column)
        .ok_or_else(|| EtlError::MissingColumn {
            column: column.to_string(),
            available: table.columns.clone(),
        })
}

impl SourceIndex {
    fn resolve(table: &Table, cfg: &SourceConfig) -> Result<Self> {
        Ok(Self {
            projected: cfg
                .columns
                .iter()
                .map(|c| index_of(table, c))
                .collect::<Result<Vec<_>>>()?,
            isin: index_of(table, &cfg.col_isin)?,
            date: index_of(table, &cfg.col_date)?,
            time: index_of(table, &cfg.col_time)?,
            start_price: index_of(table, &cfg.col_start_price)?,
            min_price: index_of(table, &cfg.col_min_price)?,
            max_price: index_of(table, &cfg.col_max_price)?,
            traded_volume: index_of(table, &cfg.col_traded_volume)?,
        })
    }
}

// ── Table → RawRecord ─────────────────────────────────────────────────────────

/// Project the source table onto the configured columns and convert each
/// complete row into a [`RawRecord`]. Rows with a gap in any projected column
/// are dropped without imputation; rows whose values do not parse are dropped
/// with a warning.
pub fn clean_records(table: &Table, cfg: &SourceConfig) -> Result<Vec<RawRecord>> {
    let idx = SourceIndex::resolve(table, cfg)?;

    let mut records = Vec::with_capacity(table.len());
    let mut incomplete = 0usize;

    for (i, row) in table.rows.iter().enumerate() {
        if idx.projected.iter().any(|&c| row[c].is_null()) {
            incomplete += 1;
            continue;
        }
        match row_to_record(row, &idx) {
            Some(rec) => records.push(rec),
            None => warn!("Row {}: unparseable values, skipped: {:?}", i + 1, row),
        }
    }

    if incomplete > 0 {
        debug!("Dropped {} rows with missing values", incomplete);
    }
    Ok(records)
}

fn row_to_record(row: &[Cell], idx: &SourceIndex) -> Option<RawRecord> {
    let text = |i: usize| row[i].to_text();

    Some(RawRecord {
        isin: text(idx.isin)?,
        date: parse_date(&text(idx.date)?)?,
        time: parse_time(&text(idx.time)?)?,
        start_price: parse_number(&text(idx.start_price)?)?,
        min_price: parse_number(&text(idx.min_price)?)?,
        max_price: parse_number(&text(idx.max_price)?)?,
        traded_volume: parse_number(&text(idx.traded_volume)?)?,
    })
}
