use crate::{LogRecord, ParseError};

/// Base trait that all parsers must implement
pub trait Parser: Send + Sync {
    /// Returns the name of this parser (e.g., "json", "csv", "text")
    fn name(&self) -> &'static str;

    /// Returns the file extensions this parser supports (e.g., ["ndjson", "jsonl"])
    fn extensions(&self) -> &'static [&'static str];

    /// Checks if this parser can handle the given content by inspecting it
    fn can_parse(&self, content: &str) -> bool;

    /// Parse the whole content into normalized records, in input order.
    ///
    /// Per-unit problems degrade to fallback records. An `Err` means the
    /// content as a whole is not in this parser's format.
    fn parse(&self, content: &str) -> Result<Vec<LogRecord>, ParseError>;
}

/// Helper to detect format from content
pub fn detect_format(content: &str) -> FormatHint {
    let trimmed = content.trim();

    // Several object lines
    if trimmed.starts_with('{') && trimmed.lines().count() > 1 {
        let first_line = trimmed.lines().next().unwrap_or("");
        if first_line.trim_end().ends_with('}') {
            return FormatHint::Ndjson;
        }
    }

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        return FormatHint::Json;
    }

    if trimmed.contains("<log>") {
        return FormatHint::Xml;
    }

    // Header row naming at least one known field
    if let Some(header) = trimmed.lines().next() {
        if header.contains(',') && header.split(',').any(|column| is_known_field(column)) {
            return FormatHint::Csv;
        }
    }

    FormatHint::Text
}

fn is_known_field(column: &str) -> bool {
    let column = column.trim().trim_matches('"');
    [
        crate::normalize::TIMESTAMP_KEYS,
        crate::normalize::LEVEL_KEYS,
        crate::normalize::SOURCE_KEYS,
        crate::normalize::MESSAGE_KEYS,
    ]
    .iter()
    .flat_map(|aliases| aliases.iter())
    .any(|alias| column.eq_ignore_ascii_case(alias))
}

/// Extension of a filename or bare hint (`"app.JSON"`, `".json"`, `"json"` all give `"json"`).
pub fn extension_of(hint: &str) -> String {
    hint.rsplit('.').next().unwrap_or("").trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatHint {
    Json,
    Ndjson,
    Csv,
    Xml,
    Text,
}

impl FormatHint {
    /// Name of the registered parser handling this format
    pub fn parser_name(&self) -> &'static str {
        match self {
            FormatHint::Json => "json",
            FormatHint::Ndjson => "ndjson",
            FormatHint::Csv => "csv",
            FormatHint::Xml => "xml",
            FormatHint::Text => "text",
        }
    }
}
