//! Field normalization shared by every structured source.
//!
//! JSON, NDJSON, CSV and XML records from files, as well as payloads from
//! the live stream, all go through [`normalize_fields`], so equivalent input
//! yields identical records whichever way it arrived.

use crate::timestamp::{format_timestamp, from_epoch, now_iso, parse_timestamp};
use crate::types::{LogLevel, LogRecord};
use chrono::DateTime;
use serde_json::{Map, Value};

pub const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "date", "datetime", "@timestamp"];
pub const LEVEL_KEYS: &[&str] = &["level", "severity", "priority", "type", "lvl"];
pub const SOURCE_KEYS: &[&str] = &["source", "component", "logger", "service"];
pub const MESSAGE_KEYS: &[&str] = &["message", "msg", "text", "content", "event"];

/// Source used for file uploads when the record names none.
pub const FILE_SOURCE: &str = "System";
/// Source used for streamed payloads when the record names none.
pub const STREAM_SOURCE: &str = "API";

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// First present value among `aliases`.
///
/// An exact key match on any alias beats a case-insensitive one, so a
/// record that already uses the canonical names is read back unchanged.
pub fn lookup<'a>(raw: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .find_map(|alias| raw.get(*alias).filter(|v| is_present(v)))
        .or_else(|| {
            aliases.iter().find_map(|alias| {
                raw.iter()
                    .find(|(key, value)| key.eq_ignore_ascii_case(alias) && is_present(value))
                    .map(|(_, value)| value)
            })
        })
}

pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Returns the ISO timestamp and whether it had to be substituted.
fn resolve_timestamp(value: Option<&Value>) -> (String, bool) {
    match value {
        Some(Value::String(s)) => {
            let s = s.trim();
            if DateTime::parse_from_rfc3339(s).is_ok() {
                (s.to_string(), false)
            } else if let Some(dt) = parse_timestamp(s) {
                (format_timestamp(&dt), false)
            } else {
                (now_iso(), true)
            }
        }
        Some(Value::Number(n)) => match n.as_f64().and_then(from_epoch) {
            Some(dt) => (format_timestamp(&dt), false),
            None => (now_iso(), true),
        },
        _ => (now_iso(), true),
    }
}

/// Build a record from one raw key/value object.
pub fn normalize_fields(raw: &Map<String, Value>, id: String, default_source: &str) -> LogRecord {
    let (timestamp, timestamp_inferred) = resolve_timestamp(lookup(raw, TIMESTAMP_KEYS));

    let level = lookup(raw, LEVEL_KEYS)
        .map(|v| LogLevel::normalize(&value_text(v)))
        .unwrap_or_default();

    let source = lookup(raw, SOURCE_KEYS)
        .map(value_text)
        .unwrap_or_else(|| default_source.to_string());

    let message = lookup(raw, MESSAGE_KEYS)
        .map(value_text)
        .unwrap_or_else(|| Value::Object(raw.clone()).to_string());

    LogRecord {
        id,
        timestamp,
        level,
        source,
        message,
        metadata: Some(raw.clone()),
        timestamp_inferred,
    }
}

/// Like [`normalize_fields`] but accepts any JSON value.
///
/// Non-object values carry no fields: the value itself becomes the message
/// and is kept under `metadata.value`.
pub fn normalize_value(value: &Value, id: String, default_source: &str) -> LogRecord {
    match value {
        Value::Object(map) => normalize_fields(map, id, default_source),
        other => {
            let mut raw = Map::new();
            raw.insert("value".to_string(), other.clone());
            LogRecord {
                id,
                timestamp: now_iso(),
                level: LogLevel::Info,
                source: default_source.to_string(),
                message: value_text(other),
                metadata: Some(raw),
                timestamp_inferred: true,
            }
        }
    }
}

/// Identifier carried by the source record, if any.
pub fn source_id(value: &Value) -> Option<String> {
    match value.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
