//! Filtering and aggregate statistics over a record set.
//!
//! Everything here is pure: records go in, a new derived sequence or count
//! comes out, and input order is preserved.

use crate::timestamp::parse_timestamp;
use crate::types::{DateRange, FilterSpec, LogRecord, Statistics};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Precomputed form of a [`FilterSpec`] so per-record checks stay cheap.
struct Criteria<'a> {
    spec: &'a FilterSpec,
    keyword: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl<'a> Criteria<'a> {
    fn new(spec: &'a FilterSpec) -> Self {
        Self {
            spec,
            keyword: (!spec.keyword.is_empty()).then(|| spec.keyword.to_lowercase()),
            from: spec.date_from.and_then(start_of_day),
            to: spec.date_to.and_then(end_of_day),
        }
    }

    fn matches(&self, record: &LogRecord) -> bool {
        if !self.spec.levels.is_empty() && !self.spec.levels.contains(&record.level) {
            return false;
        }

        if self.from.is_some() || self.to.is_some() {
            // Records whose timestamp cannot be read are not excluded by date
            if let Some(ts) = parse_timestamp(&record.timestamp) {
                if self.from.is_some_and(|from| ts < from) || self.to.is_some_and(|to| ts > to) {
                    return false;
                }
            }
        }

        if let Some(keyword) = &self.keyword {
            if !searchable_text(record).contains(keyword.as_str()) {
                return false;
            }
        }

        if !self.spec.source.is_empty() && record.source != self.spec.source {
            return false;
        }

        true
    }
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_milli_opt(0, 0, 0, 0).map(|dt| dt.and_utc())
}

fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_milli_opt(23, 59, 59, 999).map(|dt| dt.and_utc())
}

/// Lower-cased message, source and serialized metadata.
fn searchable_text(record: &LogRecord) -> String {
    let metadata = record
        .metadata
        .as_ref()
        .and_then(|m| serde_json::to_string(m).ok())
        .unwrap_or_default();
    format!("{} {} {}", record.message, record.source, metadata).to_lowercase()
}

/// Records passing every active criterion, in their original order.
pub fn filter_records(records: &[LogRecord], spec: &FilterSpec) -> Vec<LogRecord> {
    if spec.is_empty() {
        return records.to_vec();
    }
    let criteria = Criteria::new(spec);
    records.iter().filter(|r| criteria.matches(r)).cloned().collect()
}

pub fn get_statistics(records: &[LogRecord]) -> Statistics {
    records.iter().fold(Statistics::default(), |mut stats, record| {
        stats.record(record.level);
        stats
    })
}

/// Distinct sources, sorted.
pub fn get_sources(records: &[LogRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.source.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Earliest and latest calendar dates, or `None` when no record has a
/// readable timestamp.
pub fn get_date_range(records: &[LogRecord]) -> Option<DateRange> {
    let mut bounds: Option<(DateTime<Utc>, DateTime<Utc>)> = None;

    for ts in records.iter().filter_map(|r| parse_timestamp(&r.timestamp)) {
        bounds = Some(match bounds {
            Some((min, max)) => (min.min(ts), max.max(ts)),
            None => (ts, ts),
        });
    }

    bounds.map(|(min, max)| DateRange {
        min: min.date_naive().format("%Y-%m-%d").to_string(),
        max: max.date_naive().format("%Y-%m-%d").to_string(),
    })
}
