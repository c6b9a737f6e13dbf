//! Decides which source dates a run has to extract.
//!
//! Every reportable date needs the day before it as context (the day-over-day
//! change is computed against it), so ranges always start one day early.

use crate::checkpoint::{CheckpointState, SOURCE_DATE_FORMAT};
use crate::error::{EtlError, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Minimum date returned when every date is already covered. Never a real
/// reporting date; compared against by the transform's cutoff, it filters
/// out everything.
pub const NOTHING_TO_DO: NaiveDate = match NaiveDate::from_ymd_opt(2200, 1, 1) {
    Some(d) => d,
    None => panic!("invalid sentinel date"),
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractPlan {
    /// First date that appears in the report.
    pub min_date: NaiveDate,
    /// Every date to read, ascending, including the context day.
    pub dates: Vec<NaiveDate>,
}

impl ExtractPlan {
    pub fn is_noop(&self) -> bool {
        self.dates.is_empty()
    }

    /// Dates that will be reported on, i.e. what gets appended to the checkpoint.
    pub fn report_dates(&self) -> Vec<NaiveDate> {
        self.dates
            .iter()
            .copied()
            .filter(|d| *d >= self.min_date)
            .collect()
    }
}

pub fn parse_first_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), SOURCE_DATE_FORMAT).map_err(|_| EtlError::InvalidDate {
        value: s.to_string(),
        format: SOURCE_DATE_FORMAT,
    })
}

/// Plan against today's local date.
pub fn plan(first_date: &str, state: &CheckpointState) -> Result<ExtractPlan> {
    plan_until(first_date, state, Local::now().date_naive())
}

pub fn plan_until(
    first_date: &str,
    state: &CheckpointState,
    today: NaiveDate,
) -> Result<ExtractPlan> {
    let first = parse_first_date(first_date)?;
    let first_minus1 = first.pred_opt().unwrap_or(first);

    let all_dates: Vec<NaiveDate> = first_minus1
        .iter_days()
        .take_while(|d| *d <= today)
        .collect();

    let log = match state {
        CheckpointState::NotFound => {
            info!(
                "No checkpoint: extracting {} dates from {} to {}",
                all_dates.len(),
                first_minus1,
                today
            );
            return Ok(ExtractPlan {
                min_date: first,
                dates: all_dates,
            });
        }
        CheckpointState::Found(log) => log,
    };

    let existing = log.processed_dates();
    let missing: BTreeSet<NaiveDate> = all_dates
        .iter()
        .skip(1)
        .filter(|d| !existing.contains(d))
        .copied()
        .collect();

    let Some(&min_date) = missing.first() else {
        info!("All dates from {} to {} already processed", first, today);
        return Ok(ExtractPlan {
            min_date: NOTHING_TO_DO,
            dates: Vec::new(),
        });
    };

    let context_day = min_date.pred_opt().unwrap_or(min_date);
    let dates: Vec<NaiveDate> = all_dates
        .into_iter()
        .filter(|d| *d >= context_day)
        .collect();

    debug!("{} missing dates, earliest {}", missing.len(), min_date);
    info!(
        "Extracting {} dates from {} (reporting from {})",
        dates.len(),
        context_day,
        min_date
    );

    Ok(ExtractPlan { min_date, dates })
}
