//! Five-field cron expressions: `minute hour day-of-month month day-of-week`.
//!
//! Supports `*`, `*/N`, `N`, `N-M`, `N-M/S`, `N/S` and comma lists.
//! Day-of-week runs 0-6 from Sunday; `7` is accepted as Sunday too. When
//! both day fields are restricted a day matches if *either* does, as in
//! classic cron.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Timelike, Utc};
use thiserror::Error;

/// How far ahead `next_after` looks before giving up.
const SEARCH_HORIZON_DAYS: i64 = 5 * 366;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("Expected 5 fields (minute hour dom month dow), got {0}")]
    FieldCount(usize),

    #[error("Invalid {field} field '{value}': {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field("day-of-week", fields[4], 0, 7)?;
        if days_of_week.contains(&7) {
            days_of_week.retain(|d| *d != 7);
            if !days_of_week.contains(&0) {
                days_of_week.insert(0, 0);
            }
        }

        Ok(Self {
            source: fields.join(" "),
            minutes: parse_field("minute", fields[0], 0, 59)?,
            hours: parse_field("hour", fields[1], 0, 23)?,
            days_of_month: parse_field("day-of-month", fields[2], 1, 31)?,
            months: parse_field("month", fields[3], 1, 12)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether `dt` (to the minute) is a fire time.
    pub fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.minutes.contains(&dt.minute())
            && self.hours.contains(&dt.hour())
            && self.months.contains(&dt.month())
            && self.day_matches(dt.date_naive())
    }

    /// First fire time strictly after `after`, or `None` if the expression
    /// never fires within the search horizon (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after
            .naive_utc()
            .with_second(0)?
            .with_nanosecond(0)?
            .checked_add_signed(TimeDelta::minutes(1))?;
        let limit = start.checked_add_signed(TimeDelta::days(SEARCH_HORIZON_DAYS))?;

        let mut t = start;
        while t <= limit {
            if !self.months.contains(&t.month()) {
                t = first_of_next_month(t)?;
            } else if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
            } else if !self.hours.contains(&t.hour()) {
                t = t.with_minute(0)?.checked_add_signed(TimeDelta::hours(1))?;
            } else if !self.minutes.contains(&t.minute()) {
                t = t.checked_add_signed(TimeDelta::minutes(1))?;
            } else {
                return Some(t.and_utc());
            }
        }
        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(&date.day());
        let dow = self
            .days_of_week
            .contains(&date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn first_of_next_month(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_field(field: &'static str, value: &str, min: u32, max: u32) -> Result<Vec<u32>, CronError> {
    let invalid = |reason: String| CronError::InvalidField {
        field,
        value: value.to_string(),
        reason,
    };
    let number = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| invalid(format!("'{s}' is not a number")))
    };

    let mut values = Vec::new();
    for part in value.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = number(step)?;
                if step == 0 {
                    return Err(invalid("step cannot be zero".into()));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            (number(a)?, number(b)?)
        } else {
            let n = number(range)?;
            // `N/S` runs from N to the top of the range.
            (n, if step.is_some() { max } else { n })
        };

        if start < min || end > max || start > end {
            return Err(invalid(format!("{start}-{end} outside {min}-{max}")));
        }
        values.extend((start..=end).step_by(step.unwrap_or(1) as usize));
    }

    values.sort_unstable();
    values.dedup();
    Ok(values)
}
