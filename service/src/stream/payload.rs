use super::StreamingConfig;
use chrono::Utc;
use log_parser::normalize::{normalize_value, source_id, STREAM_SOURCE};
use log_parser::LogRecord;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Turn one fetched response or socket message into records.
///
/// A configured parser replaces the default normalization entirely.
/// Otherwise an array yields one record per element and anything else a
/// single record.
pub(super) fn normalize_payload(
    payload: &Value,
    config: &StreamingConfig,
    seq: &AtomicU64,
) -> Vec<LogRecord> {
    if let Some(parser) = &config.parser {
        return parser(payload);
    }

    let items: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    items
        .into_iter()
        .map(|item| {
            let id = source_id(item).unwrap_or_else(|| synthesize_id(seq));
            normalize_value(item, id, STREAM_SOURCE)
        })
        .collect()
}

fn synthesize_id(seq: &AtomicU64) -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), seq.fetch_add(1, Ordering::Relaxed))
}
