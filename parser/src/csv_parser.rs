use crate::normalize::{normalize_fields, FILE_SOURCE};
use crate::{base_parser::Parser, LogRecord, ParseError};
use csv::{ReaderBuilder, Trim};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// CSV parser - the first row names the columns, every later row is one record
///
/// Quoted fields may contain commas. Rows shorter than the header get empty
/// strings for the missing columns.
pub struct CsvParser;

impl Parser for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["csv"]
    }

    fn can_parse(&self, content: &str) -> bool {
        crate::base_parser::detect_format(content) == crate::FormatHint::Csv
    }

    fn parse(&self, content: &str) -> Result<Vec<LogRecord>, ParseError> {
        let mut csv_reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let headers = csv_reader.headers()?.clone();
        let mut records = Vec::new();

        for row_result in csv_reader.records() {
            let id = (records.len() + 1).to_string();

            let row = match row_result {
                Ok(row) => row,
                Err(e) => {
                    warn!("Keeping malformed CSV row as text: {}", e);
                    let message = raw_row(content, e.position())
                        .map_or_else(|| e.to_string(), str::to_string);
                    records.push(LogRecord::fallback(id, &message));
                    continue;
                }
            };

            // Blank line
            if row.len() == 1 && row.get(0).map_or(true, str::is_empty) {
                continue;
            }

            let mut raw = Map::new();
            for (idx, header) in headers.iter().enumerate() {
                let value = row.get(idx).unwrap_or("");
                raw.insert(header.to_string(), Value::String(value.to_string()));
            }

            records.push(normalize_fields(&raw, id, FILE_SOURCE));
        }

        info!("CSV parsing complete: {} records", records.len());
        Ok(records)
    }
}

/// The source line a reader position points at, without its line ending.
fn raw_row<'a>(content: &'a str, position: Option<&csv::Position>) -> Option<&'a str> {
    let start = usize::try_from(position?.byte()).ok()?;
    content.get(start..)?.lines().next()
}
