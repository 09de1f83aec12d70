// Log ingestion and normalization
// Format parsers behind a registry, shared field normalization, and the
// pure filter/statistics functions the service layers on top of.

pub mod types;
pub mod timestamp;
pub mod normalize;
pub mod base_parser;
pub mod registry_parser;
pub mod filter;

// Individual parser implementations
pub mod csv_parser;
pub mod ndjson_parser;
pub mod json_parser;
pub mod xml_parser;
pub mod text_parser;

mod parsers;

// Re-export main types
pub use types::*;
pub use base_parser::{Parser, FormatHint};
pub use registry_parser::ParserRegistry;
pub use filter::{filter_records, get_date_range, get_sources, get_statistics};

// Re-export parsers
pub use csv_parser::CsvParser;
pub use ndjson_parser::NdjsonParser;
pub use json_parser::JsonParser;
pub use xml_parser::XmlParser;
pub use text_parser::TextParser;

use once_cell::sync::Lazy;

static DEFAULT_REGISTRY: Lazy<ParserRegistry> = Lazy::new(ParserRegistry::new);

/// Parse file content using the built-in parsers.
///
/// `format_hint` is a filename or extension. See
/// [`ParserRegistry::parse_with_hint`].
pub fn parse(content: &str, format_hint: &str) -> Vec<LogRecord> {
    DEFAULT_REGISTRY.parse_with_hint(content, format_hint)
}
