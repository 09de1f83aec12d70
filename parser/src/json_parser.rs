use crate::normalize::{normalize_value, FILE_SOURCE};
use crate::{base_parser::Parser, LogRecord, ParseError};
use serde_json::Value;
use tracing::{debug, info};

/// JSON parser - handles a JSON array of log objects or a single root object
/// Example: [{"timestamp": "...", "level": "...", "message": "..."}, ...]
pub struct JsonParser;

impl Parser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn can_parse(&self, content: &str) -> bool {
        let trimmed = content.trim();
        trimmed.starts_with('[') || trimmed.starts_with('{')
    }

    fn parse(&self, content: &str) -> Result<Vec<LogRecord>, ParseError> {
        debug!("Parsing {} bytes of JSON content", content.len());

        let value: Value = serde_json::from_str(content.trim())?;

        let records: Vec<LogRecord> = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(idx, item)| normalize_value(item, (idx + 1).to_string(), FILE_SOURCE))
                .collect(),
            other => vec![normalize_value(&other, "1".to_string(), FILE_SOURCE)],
        };

        info!("JSON parsing complete: {} records", records.len());
        Ok(records)
    }
}
