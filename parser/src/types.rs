use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Normalized severity. Every source-specific level string collapses into
/// one of these five variants; anything unrecognized becomes `Info`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Substrings that mark an error-class level, checked before anything else.
const ERROR_MARKERS: &[&str] = &["ERR", "FATAL", "CRIT", "SEVERE", "EMERG", "ALERT"];

impl LogLevel {
    /// All variants, most severe first.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Error,
            LogLevel::Warning,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARNING",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Map an arbitrary level string onto the closed set.
    ///
    /// The value is upper-cased and substring-matched in priority order:
    /// error markers, then `WARN`, `DEBUG`, `TRACE`. No match is `Info`.
    pub fn normalize(raw: &str) -> LogLevel {
        let upper = raw.trim().to_uppercase();
        if ERROR_MARKERS.iter().any(|marker| upper.contains(marker)) {
            LogLevel::Error
        } else if upper.contains("WARN") {
            LogLevel::Warning
        } else if upper.contains("DEBUG") {
            LogLevel::Debug
        } else if upper.contains("TRACE") {
            LogLevel::Trace
        } else {
            LogLevel::Info
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(LogLevel::normalize(s))
    }
}

/// One normalized log event.
///
/// Produced in bulk by the format parsers or incrementally by the stream
/// ingestion service. Never mutated after it is produced; filtering builds
/// new sequences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Unique within one parse or stream session.
    pub id: String,
    /// ISO-8601. Substituted with the parse-time clock when the source has none.
    pub timestamp: String,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    /// Original raw fields, kept for traceability and keyword search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// Set when `timestamp` is the wall-clock fallback rather than source data.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timestamp_inferred: bool,
}

impl LogRecord {
    /// Generic INFO record for a line or unit nothing else could make sense of.
    pub fn fallback(id: impl Into<String>, raw: &str) -> Self {
        Self {
            id: id.into(),
            timestamp: crate::timestamp::now_iso(),
            level: LogLevel::Info,
            source: crate::normalize::FILE_SOURCE.to_string(),
            message: raw.trim().to_string(),
            metadata: None,
            timestamp_inferred: true,
        }
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }
}

/// Filter criteria. Every populated field must hold for a record to pass;
/// empty fields place no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSpec {
    pub levels: BTreeSet<LogLevel>,
    pub keyword: String,
    pub source: String,
    #[serde(alias = "date_from")]
    pub date_from: Option<NaiveDate>,
    #[serde(alias = "date_to")]
    pub date_to: Option<NaiveDate>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
            && self.keyword.is_empty()
            && self.source.is_empty()
            && self.date_from.is_none()
            && self.date_to.is_none()
    }
}

/// Per-level counts over a record set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub error: usize,
    pub warning: usize,
    pub info: usize,
    pub debug: usize,
    pub trace: usize,
}

impl Statistics {
    pub fn record(&mut self, level: LogLevel) {
        self.total += 1;
        match level {
            LogLevel::Error => self.error += 1,
            LogLevel::Warning => self.warning += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Debug => self.debug += 1,
            LogLevel::Trace => self.trace += 1,
        }
    }

    pub fn count(&self, level: LogLevel) -> usize {
        match level {
            LogLevel::Error => self.error,
            LogLevel::Warning => self.warning,
            LogLevel::Info => self.info,
            LogLevel::Debug => self.debug,
            LogLevel::Trace => self.trace,
        }
    }
}

/// Calendar span covered by a record set, as `YYYY-MM-DD` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub min: String,
    pub max: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("No log records found in '{filename}'")]
    NoRecords { filename: String },
    #[error("{0}")]
    Custom(String),
}

impl From<String> for ParseError {
    fn from(msg: String) -> Self {
        ParseError::Custom(msg)
    }
}

impl From<&str> for ParseError {
    fn from(msg: &str) -> Self {
        ParseError::Custom(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_normalization() {
        assert_eq!(LogLevel::normalize("CRITICAL"), LogLevel::Error);
        assert_eq!(LogLevel::normalize("err"), LogLevel::Error);
        assert_eq!(LogLevel::normalize("fatal"), LogLevel::Error);
        assert_eq!(LogLevel::normalize("warn"), LogLevel::Warning);
        assert_eq!(LogLevel::normalize("Warning"), LogLevel::Warning);
        assert_eq!(LogLevel::normalize("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::normalize("TRACE"), LogLevel::Trace);
        assert_eq!(LogLevel::normalize("info"), LogLevel::Info);
        assert_eq!(LogLevel::normalize("notice"), LogLevel::Info);
        assert_eq!(LogLevel::normalize(""), LogLevel::Info);
    }

    #[test]
    fn test_level_serializes_uppercase() {
        let json = serde_json::to_string(&LogLevel::Warning).unwrap();
        assert_eq!(json, "\"WARNING\"");
        let level: LogLevel = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(level, LogLevel::Error);
    }

    #[test]
    fn test_filter_spec_accepts_camel_case() {
        let spec: FilterSpec = serde_json::from_str(
            r#"{"levels":["ERROR"],"keyword":"db","dateFrom":"2024-01-01"}"#,
        )
        .unwrap();
        assert!(spec.levels.contains(&LogLevel::Error));
        assert_eq!(spec.keyword, "db");
        assert_eq!(spec.date_from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert!(spec.source.is_empty());
        assert!(!spec.is_empty());
    }

    #[test]
    fn test_record_omits_inferred_flag_when_false() {
        let record = LogRecord {
            id: "1".into(),
            timestamp: "2024-01-01T00:00:00Z".into(),
            level: LogLevel::Info,
            source: "svc".into(),
            message: "hello".into(),
            metadata: None,
            timestamp_inferred: false,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("timestampInferred").is_none());
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_parse_error_variants() {
        let json = serde_json::from_str::<Value>("{").unwrap_err();
        assert!(ParseError::from(json).to_string().starts_with("JSON parse error"));

        let missing = ParseError::NoRecords {
            filename: "empty.log".into(),
        };
        assert_eq!(missing.to_string(), "No log records found in 'empty.log'");

        assert!(matches!(ParseError::from("bad input"), ParseError::Custom(m) if m == "bad input"));
        assert!(matches!(ParseError::from(String::from("x")), ParseError::Custom(_)));
    }
}
