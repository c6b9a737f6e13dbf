//! Daily report: one row per (instrument, day) built from interval records.

pub mod cleaner;

use crate::config::{SourceConfig, TargetConfig};
use crate::error::Result;
use crate::models::{Cell, RawRecord, ReportRow, Table};
use crate::utils::round_to;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info};

use self::cleaner::clean_records;

/// Build the report table from raw source rows.
///
/// Rows dated before `cutoff` only seed the day-over-day change and are
/// dropped from the output. An empty input gives an empty table carrying the
/// target columns.
pub fn aggregate(
    records: &Table,
    source: &SourceConfig,
    target: &TargetConfig,
    cutoff: NaiveDate,
) -> Result<Table> {
    if records.is_empty() {
        info!("No source records, report is empty");
        return Ok(Table::new(target_columns(target)));
    }

    let raw = clean_records(records, source)?;
    debug!("{} of {} source rows usable", raw.len(), records.len());

    let report = daily_report(raw, cutoff);
    info!("Report: {} rows from {}", report.len(), cutoff);
    Ok(render(&report, target))
}

pub fn daily_report(records: Vec<RawRecord>, cutoff: NaiveDate) -> Vec<ReportRow> {
    let mut groups: BTreeMap<(String, NaiveDate), Vec<RawRecord>> = BTreeMap::new();
    for rec in records {
        groups
            .entry((rec.isin.clone(), rec.date))
            .or_default()
            .push(rec);
    }

    let mut rows = Vec::with_capacity(groups.len());
    // Groups iterate by instrument, then date; the previous row is the same
    // instrument's previous trading day whenever the ISINs match.
    let mut prev: Option<(String, f64)> = None;

    for ((isin, date), mut group) in groups {
        // Stable: records sharing a timestamp keep their input order.
        group.sort_by_key(|r| r.time);

        // Opening is the first interval's start price, closing the last one's.
        let opening_price = group.first().map(|r| r.start_price).unwrap_or(f64::NAN);
        let closing_price = group.last().map(|r| r.start_price).unwrap_or(f64::NAN);
        let min_price = group.iter().map(|r| r.min_price).fold(f64::INFINITY, f64::min);
        let max_price = group.iter().map(|r| r.max_price).fold(f64::NEG_INFINITY, f64::max);
        let daily_traded_volume: f64 = group.iter().map(|r| r.traded_volume).sum();

        let change = match &prev {
            Some((prev_isin, prev_open)) if *prev_isin == isin && *prev_open != 0.0 => {
                Some((opening_price - prev_open) / prev_open * 100.0)
            }
            _ => None,
        };
        prev = Some((isin.clone(), opening_price));

        rows.push(ReportRow {
            isin,
            date,
            opening_price: round_to(opening_price, 2),
            closing_price: round_to(closing_price, 2),
            min_price: round_to(min_price, 2),
            max_price: round_to(max_price, 2),
            daily_traded_volume: round_to(daily_traded_volume, 2),
            change_prev_closing_pct: change.map(|c| round_to(c, 2)),
        });
    }

    rows.retain(|r| r.date >= cutoff);
    rows
}

pub fn target_columns(target: &TargetConfig) -> Vec<String> {
    vec![
        target.col_isin.clone(),
        target.col_date.clone(),
        target.col_opening_price.clone(),
        target.col_closing_price.clone(),
        target.col_min_price.clone(),
        target.col_max_price.clone(),
        target.col_daily_traded_volume.clone(),
        target.col_change_prev_closing.clone(),
    ]
}

fn render(rows: &[ReportRow], target: &TargetConfig) -> Table {
    Table {
        columns: target_columns(target),
        rows: rows
            .iter()
            .map(|r| {
                vec![
                    Cell::Text(r.isin.clone()),
                    Cell::Date(r.date),
                    Cell::Float(r.opening_price),
                    Cell::Float(r.closing_price),
                    Cell::Float(r.min_price),
                    Cell::Float(r.max_price),
                    Cell::Float(r.daily_traded_volume),
                    Cell::from(r.change_prev_closing_pct),
                ]
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn rec(isin: &str, date: &str, time: &str, start: f64, min: f64, max: f64, vol: f64) -> RawRecord {
        RawRecord {
            isin: isin.to_string(),
            date: d(date),
            time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            start_price: start,
            min_price: min,
            max_price: max,
            traded_volume: vol,
        }
    }

    fn source_row(isin: &str, date: &str, time: &str, start: &str, max: &str, min: &str, vol: &str) -> Vec<Cell> {
        [isin, date, time, start, max, min, vol]
            .iter()
            .map(|s| Cell::Text(s.to_string()))
            .collect()
    }

    fn source_table(rows: Vec<Vec<Cell>>) -> Table {
        Table {
            columns: SourceConfig::default().columns,
            rows,
        }
    }

    #[test]
    fn test_two_intervals_one_day() {
        let rows = daily_report(
            vec![
                rec("X", "2021-04-14", "15:00", 21.0, 18.0, 22.0, 200.0),
                rec("X", "2021-04-14", "09:00", 20.0, 18.0, 22.0, 100.0),
            ],
            d("2021-04-14"),
        );

        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.opening_price, 20.0);
        assert_eq!(r.closing_price, 21.0);
        assert_eq!(r.min_price, 18.0);
        assert_eq!(r.max_price, 22.0);
        assert_eq!(r.daily_traded_volume, 300.0);
        assert_eq!(r.change_prev_closing_pct, None);
    }

    #[test]
    fn test_change_uses_previous_opening_and_cutoff_drops_context_day() {
        let rows = daily_report(
            vec![
                rec("X", "2021-04-13", "09:00", 20.0, 19.0, 21.0, 10.0),
                rec("X", "2021-04-13", "16:00", 25.0, 19.0, 26.0, 10.0),
                rec("X", "2021-04-14", "09:00", 22.0, 21.0, 23.0, 10.0),
                rec("Y", "2021-04-14", "09:00", 5.0, 4.0, 6.0, 1.0),
            ],
            d("2021-04-14"),
        );

        assert_eq!(rows.len(), 2);
        let x = rows.iter().find(|r| r.isin == "X").unwrap();
        assert_eq!(x.date, d("2021-04-14"));
        // against the previous day's opening (20.0), not its closing (25.0)
        assert_eq!(x.change_prev_closing_pct, Some(10.0));

        // Y has no earlier day; the change does not leak over from X
        let y = rows.iter().find(|r| r.isin == "Y").unwrap();
        assert_eq!(y.change_prev_closing_pct, None);
    }

    #[test]
    fn test_values_rounded_to_two_decimals() {
        let rows = daily_report(
            vec![
                rec("X", "2021-04-13", "09:00", 3.0, 2.0, 4.0, 1.0),
                rec("X", "2021-04-14", "09:00", 4.0, 3.3333, 4.4444, 0.125),
            ],
            d("2021-04-13"),
        );
        assert_eq!(rows[1].min_price, 3.33);
        assert_eq!(rows[1].max_price, 4.44);
        assert_eq!(rows[1].daily_traded_volume, 0.12);
        assert_eq!(rows[1].change_prev_closing_pct, Some(33.33));
    }

    #[test]
    fn test_case_distinct_isins_stay_separate() {
        let table = source_table(vec![
            source_row("abc", "2021-04-14", "09:00", "1.0", "1.0", "1.0", "1"),
            source_row("ABC", "2021-04-14", "09:00", "2.0", "2.0", "2.0", "1"),
            source_row(" ABC", "2021-04-14", "09:00", "3.0", "3.0", "3.0", "1"),
        ]);

        let target = TargetConfig::default();
        let out = aggregate(&table, &SourceConfig::default(), &target, d("2021-04-14")).unwrap();
        let mut ids: Vec<String> = out.rows.iter().map(|r| r[0].to_string()).collect();
        ids.sort();
        assert_eq!(ids, vec![" ABC", "ABC", "abc"]);
    }

    #[test]
    fn test_opening_and_closing_follow_interval_order() {
        let rows = daily_report(
            vec![
                rec("X", "2021-04-14", "12:00", 5.0, 1.0, 9.0, 1.0),
                rec("X", "2021-04-14", "09:00", 7.0, 1.0, 9.0, 1.0),
                rec("X", "2021-04-14", "17:00", 8.0, 1.0, 9.0, 1.0),
            ],
            d("2021-04-14"),
        );
        // neither is the group minimum (5.0)
        assert_eq!(rows[0].opening_price, 7.0);
        assert_eq!(rows[0].closing_price, 8.0);
    }

    #[test]
    fn test_gap_days_use_last_trading_day() {
        let rows = daily_report(
            vec![
                rec("X", "2021-04-16", "09:00", 10.0, 9.0, 11.0, 1.0),
                rec("X", "2021-04-19", "09:00", 12.0, 11.0, 13.0, 1.0),
            ],
            d("2021-04-19"),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].change_prev_closing_pct, Some(20.0));
    }

    #[test]
    fn test_empty_input_gives_empty_table() {
        let target = TargetConfig::default();
        let out = aggregate(
            &Table::default(),
            &SourceConfig::default(),
            &target,
            d("2021-04-14"),
        )
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(out.columns, target_columns(&target));
    }

    #[test]
    fn test_aggregate_one_row_per_instrument_day() {
        let table = source_table(vec![
            source_row("X", "2021-04-14", "09:00", "20.0", "22.0", "18.0", "100"),
            source_row("X", "2021-04-14", "15:00", "21.0", "22.0", "18.0", "200"),
            source_row("X", "2021-04-15", "09:00", "21.0", "22.0", "18.0", "50"),
            source_row("Y", "2021-04-14", "10:00", "7.5", "8.0", "7.0", "10"),
            source_row("Y", "2021-04-13", "10:00", "7.0", "8.0", "7.0", "10"),
        ]);

        let target = TargetConfig::default();
        let mut out = aggregate(&table, &SourceConfig::default(), &target, d("2021-04-14")).unwrap();
        out.rows.sort_by_key(|r| (r[0].to_string(), r[1].to_string()));

        assert_eq!(out.columns, target_columns(&target));
        assert_eq!(out.len(), 3);
        assert_eq!(
            out.rows[0],
            vec![
                Cell::Text("X".into()),
                Cell::Date(d("2021-04-14")),
                Cell::Float(20.0),
                Cell::Float(21.0),
                Cell::Float(18.0),
                Cell::Float(22.0),
                Cell::Float(300.0),
                Cell::Null,
            ]
        );
        assert_eq!(out.rows[1][6], Cell::Float(50.0));
        assert_eq!(out.rows[1][7], Cell::Float(5.0));
        assert_eq!(out.rows[2][1], Cell::Date(d("2021-04-14")));
        assert_eq!(out.rows[2][7], Cell::Float(7.14));
    }

    #[test]
    fn test_sentinel_cutoff_filters_everything() {
        let rows = daily_report(
            vec![rec("X", "2021-04-14", "09:00", 20.0, 18.0, 22.0, 1.0)],
            crate::planner::NOTHING_TO_DO,
        );
        assert!(rows.is_empty());
    }
}
