use crate::base_parser::{detect_format, extension_of, FormatHint, Parser};
use crate::parsers::all_parsers;
use crate::{LogRecord, ParseError, TextParser};
use tracing::{debug, info, warn};

/// ParserRegistry - manages available parsers and dispatches content to them
///
/// ## Adding a New Parser
///
/// To add a new parser, you only need to modify `parsers.rs`. No changes to this file are required!
/// See `parsers.rs` for instructions.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn Parser>>,
}

impl ParserRegistry {
    /// Create a new registry with all parsers from the central registry
    pub fn new() -> Self {
        let parsers = all_parsers();

        info!(
            "Registered {} parsers: {}",
            parsers.len(),
            parsers.iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        );

        Self { parsers }
    }

    /// Register a custom parser
    ///
    /// Custom parsers are consulted after the built-in ones for extension
    /// lookups, so they can only claim extensions nobody else handles.
    pub fn register(&mut self, parser: Box<dyn Parser>) {
        info!("Registering custom parser: {}", parser.name());
        debug!("Parser supports extensions: {:?}", parser.extensions());
        self.parsers.push(parser);
    }

    /// Get parser by name
    pub fn get_parser(&self, name: &str) -> Option<&dyn Parser> {
        debug!("Looking up parser by name: {}", name);
        self.parsers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    /// Get parser by file extension
    pub fn get_parser_by_extension(&self, extension: &str) -> Option<&dyn Parser> {
        debug!("Looking up parser by extension: {}", extension);
        let result = self
            .parsers
            .iter()
            .find(|p| p.extensions().contains(&extension))
            .map(|p| p.as_ref());

        match result {
            Some(parser) => debug!("Selected parser '{}' for extension '.{}'", parser.name(), extension),
            None => debug!("No parser registered for extension '.{}'", extension),
        }

        result
    }

    /// Run `parser`, re-dispatching the whole content to plain text if it
    /// rejects the content.
    fn run(&self, parser: &dyn Parser, content: &str) -> Vec<LogRecord> {
        match parser.parse(content) {
            Ok(records) => records,
            Err(e) => {
                warn!("Parser '{}' failed ({}), falling back to plain text", parser.name(), e);
                TextParser.parse_lines(content)
            }
        }
    }

    /// Parse with explicit format hint (filename or extension)
    ///
    /// Unknown or missing extensions go to the plain-text strategy. Never
    /// fails; an empty result means the content held nothing parseable.
    pub fn parse_with_hint(&self, content: &str, filename: &str) -> Vec<LogRecord> {
        let extension = extension_of(filename);
        debug!("Extracted extension: '{}' from '{}'", extension, filename);

        let records = match self.get_parser_by_extension(&extension) {
            Some(parser) => {
                info!("Using parser '{}' for '{}'", parser.name(), filename);
                self.run(parser, content)
            }
            None => {
                info!("No parser for extension '{}', using plain text", extension);
                TextParser.parse_lines(content)
            }
        };

        info!("Parsed {} records from '{}'", records.len(), filename);
        records
    }

    /// Parse an uploaded file, reporting an empty result as an error
    ///
    /// Lets callers tell "the file held no log records" apart from other
    /// failures without inspecting the record count themselves.
    pub fn parse_upload(&self, content: &str, filename: &str) -> Result<Vec<LogRecord>, ParseError> {
        let records = self.parse_with_hint(content, filename);
        if records.is_empty() {
            warn!("No records found in '{}'", filename);
            return Err(ParseError::NoRecords {
                filename: filename.to_string(),
            });
        }
        Ok(records)
    }

    /// Auto-detect the format from the content itself and parse
    pub fn parse_auto(&self, content: &str) -> Vec<LogRecord> {
        let format = detect_format(content);
        info!("Format hint from content analysis: {:?}", format);

        let parser = match format {
            FormatHint::Text => {
                // Give custom parsers a chance before settling on plain text
                self.parsers
                    .iter()
                    .filter(|p| p.name() != "text")
                    .find(|p| {
                        let can_parse = p.can_parse(content);
                        debug!("Parser '{}' can_parse result: {}", p.name(), can_parse);
                        can_parse
                    })
                    .map(|p| p.as_ref())
            }
            known => self.get_parser(known.parser_name()),
        };

        match parser {
            Some(parser) => {
                info!("Selected parser: {}", parser.name());
                self.run(parser, content)
            }
            None => TextParser.parse_lines(content),
        }
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
