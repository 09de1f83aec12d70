//! Central parser registration module
//!
//! When adding a new parser, you only need to:
//! 1. Create your parser file (e.g., logfmt_parser.rs)
//! 2. Export it in lib.rs: `pub mod logfmt_parser; pub use logfmt_parser::LogfmtParser;`
//! 3. Add it to the `all_parsers()` function below
//!
//! No need to modify base_parser.rs or registry_parser.rs.

use crate::base_parser::Parser;
use crate::{CsvParser, JsonParser, NdjsonParser, TextParser, XmlParser};
use tracing::info;

/// Returns a vector of all available parsers.
///
/// Order matters for content sniffing: `ParserRegistry::parse_auto` asks each
/// parser's `can_parse` in this order, and the text parser accepts anything,
/// so it stays last.
///
/// ```rust,ignore
/// pub fn all_parsers() -> Vec<Box<dyn Parser>> {
///     register_parsers![
///         JsonParser,
///         LogfmtParser,  // <-- Add your parser here
///         TextParser,
///     ]
/// }
/// ```
pub fn all_parsers() -> Vec<Box<dyn Parser>> {
    info!("Initializing parser collection");

    crate::register_parsers![JsonParser, NdjsonParser, CsvParser, XmlParser, TextParser]
}

/// Macro to make parser registration even simpler
///
/// Usage:
/// ```rust,ignore
/// register_parsers![
///     JsonParser,
///     CsvParser,
///     TextParser,
/// ]
/// ```
#[macro_export]
macro_rules! register_parsers {
    ($($parser:expr),* $(,)?) => {
        vec![
            $(Box::new($parser) as Box<dyn $crate::base_parser::Parser>),*
        ]
    };
}
