//! Best-effort timestamp handling shared by every parser.
//!
//! Anything that looks like a date is turned into an RFC 3339 string with
//! millisecond precision. Naive times are read as UTC. When nothing parses,
//! callers substitute the current time and flag the record.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// `08:15:22,123` style fractional seconds (log4j, Python logging).
static COMMA_FRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2}:\d{2}:\d{2}),(\d{1,9})").expect("valid regex"));

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%d/%b/%Y:%H:%M:%S %z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Epoch values below this are seconds, above it milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }

    let candidate = COMMA_FRACTION.replace(text, "$1.$2");

    if let Ok(dt) = DateTime::parse_from_rfc3339(&candidate) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&candidate, fmt) {
            return Some(dt.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    // Syslog carries no year
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_year = format!("{} {}", Utc::now().year(), collapsed);
    if let Ok(dt) = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S") {
        return Some(dt.and_utc());
    }

    dateparser::parse_with_timezone(text, &Utc).ok()
}

/// Interpret a JSON number as epoch seconds or milliseconds.
pub fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() < EPOCH_MILLIS_THRESHOLD {
        value * 1000.0
    } else {
        value
    };
    Utc.timestamp_millis_opt(millis as i64).single()
}

pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_iso() -> String {
    format_timestamp(&Utc::now())
}

/// Normalize a timestamp substring, falling back to now.
///
/// Returns the ISO string and whether the fallback was used.
pub fn resolve_or_now(text: &str) -> (String, bool) {
    match parse_timestamp(text) {
        Some(dt) => (format_timestamp(&dt), false),
        None => (now_iso(), true),
    }
}

/// Calendar date of a record timestamp, if it parses.
pub fn date_of(timestamp: &str) -> Option<NaiveDate> {
    parse_timestamp(timestamp).map(|dt| dt.date_naive())
}
