use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;

// ── Tabular data ──────────────────────────────────────────────────────────────

/// A single value in a [`Table`]. Values read from CSV always arrive as `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Text rendering used by the CSV codec; `None` for nulls.
    pub fn to_text(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        Some(self.to_string())
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Float(x) => write!(f, "{}", x),
            Cell::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map(Cell::Float).unwrap_or(Cell::Null)
    }
}

/// Column-named rows. The in-memory stand-in for a data frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Stack tables vertically. Columns are aligned by name; the result has
    /// the union of all columns in first-seen order, gaps filled with `Null`.
    pub fn concat(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        for t in &tables {
            for c in &t.columns {
                if !columns.contains(c) {
                    columns.push(c.clone());
                }
            }
        }

        let mut out = Table::new(columns);
        for t in tables {
            let mapping: Vec<Option<usize>> =
                out.columns.iter().map(|c| t.column_index(c)).collect();
            for mut row in t.rows {
                let aligned = mapping
                    .iter()
                    .map(|idx| match idx {
                        Some(i) if *i < row.len() => std::mem::replace(&mut row[*i], Cell::Null),
                        _ => Cell::Null,
                    })
                    .collect();
                out.rows.push(aligned);
            }
        }
        out
    }
}

// ── Raw trading record ────────────────────────────────────────────────────────

/// One cleaned source row: a single instrument over one trading interval.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub isin: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub start_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub traded_volume: f64,
}

// ── Report row ────────────────────────────────────────────────────────────────

/// Aggregated daily figures for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub isin: String,
    pub date: NaiveDate,
    pub opening_price: f64,
    /// Start price of the last interval of the day.
    pub closing_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub daily_traded_volume: f64,
    /// Percent change of `opening_price` against the previous trading day's
    /// opening price; `None` for an instrument's first day in the window.
    pub change_prev_closing_pct: Option<f64>,
}

// ── Checkpoint entry ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub source_date: NaiveDate,
    pub processed_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_concat_aligns_columns_by_name() {
        let a = Table {
            columns: vec!["a".into(), "b".into()],
            rows: vec![vec![text("1"), text("2")]],
        };
        let b = Table {
            columns: vec!["b".into(), "c".into()],
            rows: vec![vec![text("3"), text("4")]],
        };

        let all = Table::concat(vec![a, b]);
        assert_eq!(all.columns, vec!["a", "b", "c"]);
        assert_eq!(all.rows[0], vec![text("1"), text("2"), Cell::Null]);
        assert_eq!(all.rows[1], vec![Cell::Null, text("3"), text("4")]);
    }

    #[test]
    fn test_concat_of_nothing_is_empty() {
        let all = Table::concat(vec![]);
        assert!(all.is_empty());
        assert!(all.columns.is_empty());
    }

    #[test]
    fn test_blank_text_counts_as_null() {
        assert!(text("  ").is_null());
        assert!(Cell::Float(f64::NAN).is_null());
        assert!(!Cell::Float(0.0).is_null());
        assert_eq!(Cell::Null.to_text(), None);
        assert_eq!(
            Cell::Date(NaiveDate::from_ymd_opt(2021, 4, 14).unwrap()).to_text(),
            Some("2021-04-14".to_string())
        );
    }
}
