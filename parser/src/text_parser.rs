//! Plain-text log lines.
//!
//! Each non-blank line is tried against [`LINE_PATTERNS`] in order and the
//! first match wins. The order is part of the contract: the shapes that
//! capture the most structure come first, so that for example an access-log
//! line is not read as a bare `LEVEL message` pair. Reordering the list
//! changes how ambiguous lines are classified.

use crate::normalize::FILE_SOURCE;
use crate::timestamp::resolve_or_now;
use crate::{base_parser::Parser, LogLevel, LogRecord, ParseError};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::{debug, info};

const TS: &str = r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d{1,9})?(?:Z|[+-]\d{2}:?\d{2})?";
const LEVEL: &str = r"(?i:TRACE|DEBUG|INFO|NOTICE|WARNING|WARN|ERROR|ERR|FATAL|CRITICAL|CRIT|SEVERE)";
const LEVEL_UPPER: &str = r"TRACE|DEBUG|INFO|NOTICE|WARNING|WARN|ERROR|ERR|FATAL|CRITICAL|CRIT|SEVERE";
const HTTP_METHODS: &str = r"GET|POST|PUT|PATCH|DELETE|HEAD|OPTIONS|CONNECT|TRACE";

/// Source name given to access-log lines.
pub const HTTP_SOURCE: &str = "Express HTTP";

/// What a pattern pulled out of one line.
struct LineFields<'a> {
    timestamp: Option<&'a str>,
    level: LogLevel,
    source: Option<String>,
    message: String,
    extra: Map<String, Value>,
}

impl<'a> LineFields<'a> {
    fn new(level: LogLevel, message: &str) -> Self {
        Self {
            timestamp: None,
            level,
            source: None,
            message: message.trim().to_string(),
            extra: Map::new(),
        }
    }

    fn at(mut self, timestamp: Option<&'a str>) -> Self {
        self.timestamp = timestamp;
        self
    }

    fn from_source(mut self, source: Option<&str>) -> Self {
        self.source = source.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        self
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

struct LinePattern {
    name: &'static str,
    regex: Regex,
    extract: for<'a> fn(&Captures<'a>, &'a str) -> LineFields<'a>,
}

fn group<'a>(caps: &Captures<'a>, idx: usize) -> Option<&'a str> {
    caps.get(idx).map(|m| m.as_str())
}

fn level_of(caps: &Captures<'_>, idx: usize) -> LogLevel {
    group(caps, idx).map(LogLevel::normalize).unwrap_or_default()
}

/// `2024-01-27 08:15:22,123 [main] ERROR com.foo.Bar - failure`
fn java<'a>(caps: &Captures<'a>, _line: &'a str) -> LineFields<'a> {
    LineFields::new(level_of(caps, 3), group(caps, 5).unwrap_or(""))
        .at(group(caps, 1))
        .from_source(group(caps, 4))
        .with("thread", Value::String(group(caps, 2).unwrap_or("").to_string()))
}

/// `GET /api 503 120 - upstream timeout`
fn http_access<'a>(caps: &Captures<'a>, line: &'a str) -> LineFields<'a> {
    let status: u16 = group(caps, 3).and_then(|s| s.parse().ok()).unwrap_or(0);
    let level = if status >= 500 {
        LogLevel::Error
    } else if status >= 400 {
        LogLevel::Warning
    } else {
        LogLevel::Info
    };
    let detail = group(caps, 5)
        .map(|d| d.trim().trim_start_matches('-').trim())
        .unwrap_or("");

    LineFields::new(level, line)
        .from_source(Some(HTTP_SOURCE))
        .with("method", Value::String(group(caps, 1).unwrap_or("").to_string()))
        .with("path", Value::String(group(caps, 2).unwrap_or("").to_string()))
        .with("status", Value::from(status))
        .with("bytes", Value::String(group(caps, 4).unwrap_or("").to_string()))
        .with("detail", Value::String(detail.to_string()))
}

/// `[ERROR] 2024-01-27T08:15:22Z message`
fn level_first<'a>(caps: &Captures<'a>, _line: &'a str) -> LineFields<'a> {
    LineFields::new(level_of(caps, 1), group(caps, 3).unwrap_or("")).at(group(caps, 2))
}

/// `[2024-01-27 08:15:22] ERROR: message`
fn bracketed_timestamp<'a>(caps: &Captures<'a>, _line: &'a str) -> LineFields<'a> {
    LineFields::new(level_of(caps, 2), group(caps, 3).unwrap_or("")).at(group(caps, 1))
}

/// `2024-01-27 08:15:22 ERROR [db] message`
fn timestamp_first<'a>(caps: &Captures<'a>, _line: &'a str) -> LineFields<'a> {
    LineFields::new(level_of(caps, 2), group(caps, 4).unwrap_or(""))
        .at(group(caps, 1))
        .from_source(group(caps, 3))
}

static LEADING_LEVEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\[?({LEVEL})\]?[:\s]")).expect("valid regex")
});

/// `Jan 27 08:15:22 web-01 sshd[4242]: error: auth failed`
fn syslog<'a>(caps: &Captures<'a>, _line: &'a str) -> LineFields<'a> {
    let message = group(caps, 5).unwrap_or("");
    let level = LEADING_LEVEL
        .captures(message)
        .map(|c| level_of(&c, 1))
        .unwrap_or_default();

    let mut fields = LineFields::new(level, message)
        .at(group(caps, 1))
        .from_source(group(caps, 3))
        .with("host", Value::String(group(caps, 2).unwrap_or("").to_string()));
    if let Some(pid) = group(caps, 4) {
        fields = fields.with("pid", Value::String(pid.to_string()));
    }
    fields
}

/// `ERROR:root:message`
fn colon_delimited<'a>(caps: &Captures<'a>, _line: &'a str) -> LineFields<'a> {
    LineFields::new(level_of(caps, 1), group(caps, 3).unwrap_or("")).from_source(group(caps, 2))
}

/// `[WARN] message` or `WARN: message`
fn bare_level<'a>(caps: &Captures<'a>, _line: &'a str) -> LineFields<'a> {
    let level = group(caps, 1)
        .or_else(|| group(caps, 2))
        .map(LogLevel::normalize)
        .unwrap_or_default();
    LineFields::new(level, group(caps, 3).unwrap_or(""))
}

fn pattern(
    name: &'static str,
    regex: &str,
    extract: for<'a> fn(&Captures<'a>, &'a str) -> LineFields<'a>,
) -> LinePattern {
    LinePattern {
        name,
        regex: Regex::new(regex).expect("valid line pattern"),
        extract,
    }
}

/// Line shapes in priority order. First match wins.
static LINE_PATTERNS: Lazy<Vec<LinePattern>> = Lazy::new(|| {
    vec![
        pattern(
            "java",
            &format!(r"^({TS})\s+\[([^\]]+)\]\s+({LEVEL})\s+(\S+)\s+-\s+(.*)$"),
            java,
        ),
        pattern(
            "http_access",
            &format!(r"^({HTTP_METHODS})\s+(\S+)\s+(\d{{3}})\s+(\S+)(?:\s+(.*))?$"),
            http_access,
        ),
        pattern(
            "level_first",
            &format!(r"^\[?({LEVEL})\]?\s+({TS})\s+(.*)$"),
            level_first,
        ),
        pattern(
            "bracketed_timestamp",
            &format!(r"^\[({TS})\]\s+\[?({LEVEL})\]?:?\s+(.*)$"),
            bracketed_timestamp,
        ),
        pattern(
            "timestamp_first",
            &format!(r"^({TS})\s+\[?({LEVEL})\]?:?\s+(?:\[([^\]]+)\]\s+)?(?:-\s+)?(.*)$"),
            timestamp_first,
        ),
        pattern(
            "syslog",
            r"^([A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(\S+)\s+([^\s:\[]+)(?:\[(\d+)\])?:\s+(.*)$",
            syslog,
        ),
        pattern(
            "colon_delimited",
            &format!(r"^({LEVEL}):([^:\s][^:]*):(.*)$"),
            colon_delimited,
        ),
        pattern(
            "bare_level",
            &format!(r"^(?:\[({LEVEL})\]|({LEVEL_UPPER}):?)\s+(.*)$"),
            bare_level,
        ),
    ]
});

/// Plain-text parser - the catch-all strategy, one record per non-blank line
pub struct TextParser;

impl TextParser {
    /// Parse one line, or `None` when no pattern recognizes it.
    fn match_line(line: &str, id: &str) -> Option<LogRecord> {
        LINE_PATTERNS.iter().find_map(|pattern| {
            let caps = pattern.regex.captures(line)?;
            let fields = (pattern.extract)(&caps, line);
            debug!("Line matched pattern '{}'", pattern.name);

            let (timestamp, timestamp_inferred) = resolve_or_now(fields.timestamp.unwrap_or(""));

            let mut metadata = fields.extra;
            metadata.insert("pattern".to_string(), Value::String(pattern.name.to_string()));
            metadata.insert("raw".to_string(), Value::String(line.to_string()));

            Some(LogRecord {
                id: id.to_string(),
                timestamp,
                level: fields.level,
                source: fields.source.unwrap_or_else(|| FILE_SOURCE.to_string()),
                message: fields.message,
                metadata: Some(metadata),
                timestamp_inferred,
            })
        })
    }

    /// Infallible line parse used directly and as the fallback for
    /// structured formats that fail.
    pub fn parse_lines(&self, content: &str) -> Vec<LogRecord> {
        let mut records = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let id = (records.len() + 1).to_string();
            let record = match Self::match_line(line, &id) {
                Some(record) => record,
                None => LogRecord::fallback(id, line),
            };
            records.push(record);
        }

        info!("Text parsing complete: {} records", records.len());
        records
    }
}

impl Parser for TextParser {
    fn name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["log", "txt", "out"]
    }

    fn can_parse(&self, _content: &str) -> bool {
        true
    }

    fn parse(&self, content: &str) -> Result<Vec<LogRecord>, ParseError> {
        Ok(self.parse_lines(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn one(line: &str) -> LogRecord {
        let mut records = TextParser.parse_lines(line);
        assert_eq!(records.len(), 1, "expected one record for {line:?}");
        records.remove(0)
    }

    #[test]
    fn test_java_style() {
        let record = one("2024-01-27 08:15:22,123 [main] ERROR com.foo.Bar - failure");
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.source, "com.foo.Bar");
        assert_eq!(record.message, "failure");
        assert_eq!(record.metadata_value("thread"), Some(&json!("main")));
        assert_eq!(record.timestamp, "2024-01-27T08:15:22.123Z");
        assert!(!record.timestamp_inferred);
    }

    #[test]
    fn test_http_access_status_levels() {
        let record = one("GET /api 503 120 - upstream timeout");
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.source, "Express HTTP");
        assert_eq!(record.metadata_value("status"), Some(&json!(503)));
        assert_eq!(record.metadata_value("detail"), Some(&json!("upstream timeout")));

        assert_eq!(one("POST /login 401 12").level, LogLevel::Warning);
        assert_eq!(one("GET /health 200 2").level, LogLevel::Info);
    }

    #[test]
    fn test_level_then_timestamp() {
        let record = one("[WARN] 2024-01-27T08:15:22Z cache nearly full");
        assert_eq!(record.level, LogLevel::Warning);
        assert_eq!(record.message, "cache nearly full");
        assert_eq!(record.timestamp, "2024-01-27T08:15:22.000Z");
    }

    #[test]
    fn test_timestamp_then_level() {
        let record = one("2024-01-27 08:15:22 DEBUG [scheduler] tick");
        assert_eq!(record.level, LogLevel::Debug);
        assert_eq!(record.source, "scheduler");
        assert_eq!(record.message, "tick");

        let record = one("2024-01-27T08:15:22Z info: started");
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.message, "started");
        assert_eq!(record.source, "System");
    }

    #[test]
    fn test_bracketed_timestamp() {
        let record = one("[2024-01-27 08:15:22] ERROR: payment declined");
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.message, "payment declined");
    }

    #[test]
    fn test_syslog() {
        let record = one("Jan 27 08:15:22 web-01 sshd[4242]: error: auth failed");
        assert_eq!(record.source, "sshd");
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.metadata_value("host"), Some(&json!("web-01")));
        assert_eq!(record.metadata_value("pid"), Some(&json!("4242")));
    }

    #[test]
    fn test_colon_delimited() {
        let record = one("WARNING:urllib3.connectionpool:Retrying request");
        assert_eq!(record.level, LogLevel::Warning);
        assert_eq!(record.source, "urllib3.connectionpool");
        assert_eq!(record.message, "Retrying request");
    }

    #[test]
    fn test_bare_level() {
        let record = one("[trace] entering handler");
        assert_eq!(record.level, LogLevel::Trace);
        assert_eq!(record.message, "entering handler");

        let record = one("FATAL: out of memory");
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.message, "out of memory");
    }

    #[test]
    fn test_unmatched_line_is_generic() {
        let record = one("something happened somewhere");
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.source, "System");
        assert_eq!(record.message, "something happened somewhere");
        assert!(record.metadata.is_none());
        assert!(record.timestamp_inferred);
    }

    #[test]
    fn test_http_line_is_not_a_bare_level_pair() {
        // TRACE is both an HTTP method and a level word
        let record = one("TRACE /debug 200 0");
        assert_eq!(record.source, "Express HTTP");
        assert_eq!(record.level, LogLevel::Info);
    }

    #[test]
    fn test_order_and_blank_lines() {
        let records = TextParser.parse_lines("INFO: a\n\n  \r\nERROR: b\r\nplain c\n");
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "plain c"]);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
