//! Date range for querying and expanding events.

use chrono::{Duration, Local, NaiveDate};

/// Number of days shown when no end date is given.
pub const DEFAULT_RANGE_DAYS: i64 = 7;

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl Default for DateRange {
    /// Default range: today plus DEFAULT_RANGE_DAYS
    fn default() -> Self {
        let today = Local::now().date_naive();
        DateRange {
            from: today,
            to: today + Duration::days(DEFAULT_RANGE_DAYS),
        }
    }
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        DateRange { from, to }
    }

    /// Parse `--from`/`--to` style arguments (YYYY-MM-DD).
    /// - `from` defaults to today
    /// - `to` defaults to `from` + DEFAULT_RANGE_DAYS
    pub fn from_args(from: Option<&str>, to: Option<&str>) -> Result<Self, String> {
        let from = match from {
            Some(s) => parse_date(s)?,
            None => Local::now().date_naive(),
        };

        let to = match to {
            Some(s) => parse_date(s)?,
            None => from + Duration::days(DEFAULT_RANGE_DAYS),
        };

        if to < from {
            return Err(format!("Range end {} is before its start {}", to, from));
        }

        Ok(DateRange { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Whether the inclusive span `[first, last]` touches this range.
    pub fn overlaps(&self, first: NaiveDate, last: NaiveDate) -> bool {
        first <= self.to && last >= self.from
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))
}
