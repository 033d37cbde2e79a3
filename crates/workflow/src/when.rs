//! Human-friendly time phrases for one-shot jobs.
//!
//! Accepted forms:
//! - unix seconds (`1767225600`), or milliseconds when above 10^10
//! - ISO-8601 / RFC 3339, with or without an offset (`2026-03-01T15:00:00`,
//!   `2026-03-01 15:00`, `2026-03-01T15:00:00Z`)
//! - `in N seconds|minutes|hours|days`
//! - `today|tomorrow [at] H[:MM] [am|pm]`
//!
//! Times without an offset are read in the time zone of `now`.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use regex::Regex;

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^in\s+(\d+)\s*(second|seconds|minute|minutes|hour|hours|day|days)$")
        .expect("valid regex")
});
static DAY_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(today|tomorrow)(?:\s+at)?\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$")
        .expect("valid regex")
});

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse `text` relative to `now`, using the machine's local time zone
/// for phrases without an explicit offset.
pub fn parse_when(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    parse_when_in(text, now.with_timezone(&Local))
}

/// Like [`parse_when`], with the local time zone taken from `now`.
pub fn parse_when_in<Tz: TimeZone>(text: &str, now: DateTime<Tz>) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.bytes().all(|b| b.is_ascii_digit()) {
        let raw: i64 = text.parse().ok()?;
        let secs = if raw > 10_000_000_000 { raw / 1000 } else { raw };
        return DateTime::from_timestamp(secs, 0);
    }

    if let Some(parsed) = parse_iso(text, &now.timezone()) {
        return Some(parsed);
    }

    let lower = text.to_lowercase();

    if let Some(caps) = RELATIVE.captures(&lower) {
        let amount: i64 = caps[1].parse().ok()?;
        let delta = match &caps[2] {
            unit if unit.starts_with("second") => TimeDelta::try_seconds(amount)?,
            unit if unit.starts_with("minute") => TimeDelta::try_minutes(amount)?,
            unit if unit.starts_with("hour") => TimeDelta::try_hours(amount)?,
            _ => TimeDelta::try_days(amount)?,
        };
        return now.checked_add_signed(delta).map(|t| t.to_utc());
    }

    if let Some(caps) = DAY_PHRASE.captures(&lower) {
        let mut hour: u32 = caps[2].parse().ok()?;
        let minute: u32 = caps.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if let Some(meridiem) = caps.get(4) {
            if hour == 12 {
                hour = 0;
            }
            if meridiem.as_str() == "pm" {
                hour += 12;
            }
        }
        if hour > 23 || minute > 59 {
            return None;
        }

        let mut date = now.date_naive();
        if &caps[1] == "tomorrow" {
            date = date.succ_opt()?;
        }
        let naive = date.and_hms_opt(hour, minute, 0)?;
        return now
            .timezone()
            .from_local_datetime(&naive)
            .earliest()
            .map(|t| t.to_utc());
    }

    None
}

fn parse_iso<Tz: TimeZone>(text: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    let normalized = match text.strip_suffix('Z').or_else(|| text.strip_suffix('z')) {
        Some(stripped) => format!("{stripped}+00:00"),
        None => text.to_string(),
    };

    if let Ok(parsed) = normalized.parse::<DateTime<FixedOffset>>() {
        return Some(parsed.to_utc());
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    tz.from_local_datetime(&naive).earliest().map(|t| t.to_utc())
}
