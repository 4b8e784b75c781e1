//! Best-effort, locale-agnostic date parsing for search bounds.
//!
//! ## Supported input
//! - RFC 3339 (`2014-03-01T12:00:00Z`, `2014-03-01T12:00:00+02:00`)
//! - `YYYY-MM-DD HH:MM[:SS[.ffffff]]` and the `T`-separated form
//! - `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYY.MM.DD`
//! - `MM/DD/YYYY`, `DD.MM.YYYY`
//! - `March 1, 2014`, `1 March 2014`, `Mar 1 2014`
//! - a bare year (`2014`) or compact day (`20140301`)
//! - integer epoch milliseconds
//!
//! Naive values are interpreted as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d %B %Y",
    "%d %B, %Y",
];

/// `1990-01-01T00:00:00Z`, the floor used when only `end` is supplied.
pub const DEFAULT_START_MS: i64 = 631_152_000_000;

/// Parses `raw` into Unix epoch milliseconds, or `None` when no supported
/// format matches.
pub fn parse_date_ms(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return parse_numeric(trimmed);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc).timestamp_millis());
    }

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&parsed).timestamp_millis());
        }
    }

    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(start_of_day_ms(parsed));
        }
    }

    None
}

fn parse_numeric(digits: &str) -> Option<i64> {
    if digits.len() == 4 {
        let year = digits.parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, 1, 1).map(start_of_day_ms);
    }
    if digits.len() == 8 {
        if let Ok(date) = NaiveDate::parse_from_str(digits, "%Y%m%d") {
            return Some(start_of_day_ms(date));
        }
    }
    digits.parse::<i64>().ok()
}

fn start_of_day_ms(date: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
        .timestamp_millis()
}
