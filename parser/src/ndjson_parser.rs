use crate::normalize::{normalize_value, FILE_SOURCE};
use crate::{base_parser::Parser, LogRecord, ParseError};
use serde_json::Value;
use tracing::debug;

/// NDJSON parser - handles newline-delimited JSON format
pub struct NdjsonParser;

impl Parser for NdjsonParser {
    fn name(&self) -> &'static str {
        "ndjson"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["ndjson", "jsonl"]
    }

    fn can_parse(&self, content: &str) -> bool {
        let trimmed = content.trim();

        // Check if it starts with { and has multiple lines
        if !trimmed.starts_with('{') || trimmed.lines().count() < 2 {
            return false;
        }

        // Check if first line is valid JSON object
        if let Some(first_line) = trimmed.lines().next() {
            first_line.trim_end().ends_with('}')
                && serde_json::from_str::<Value>(first_line).is_ok()
        } else {
            false
        }
    }

    fn parse(&self, content: &str) -> Result<Vec<LogRecord>, ParseError> {
        let mut records = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            let id = (records.len() + 1).to_string();
            let record = match serde_json::from_str::<Value>(line) {
                Ok(value) => normalize_value(&value, id, FILE_SOURCE),
                Err(e) => {
                    debug!("Line {} is not JSON ({}), keeping it as text", line_no + 1, e);
                    LogRecord::fallback(id, line)
                }
            };
            records.push(record);
        }

        Ok(records)
    }
}
