use crate::normalize::{normalize_fields, FILE_SOURCE};
use crate::{base_parser::Parser, LogRecord, ParseError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::info;

static LOG_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<log>(.*?)</log>").expect("valid regex"));
static OPEN_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z_@][A-Za-z0-9_.:@-]*)>").expect("valid regex"));

/// XML parser - one record per `<log>...</log>` block, one field per child element
///
/// This is a tag matcher, not an XML parser: attributes, namespaces and
/// nesting below the child level are not interpreted.
pub struct XmlParser;

impl XmlParser {
    fn child_fields(block: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        let mut pos = 0;

        while let Some(caps) = OPEN_TAG.captures_at(block, pos) {
            let (Some(open), Some(name)) = (caps.get(0), caps.get(1)) else {
                break;
            };
            let close = format!("</{}>", name.as_str());
            let body_start = open.end();

            match block[body_start..].find(&close) {
                Some(len) => {
                    let body = block[body_start..body_start + len].trim();
                    fields.insert(name.as_str().to_string(), Value::String(decode_entities(body)));
                    pos = body_start + len + close.len();
                }
                None => pos = open.end(),
            }
        }

        fields
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

impl Parser for XmlParser {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["xml"]
    }

    fn can_parse(&self, content: &str) -> bool {
        content.contains("<log>")
    }

    fn parse(&self, content: &str) -> Result<Vec<LogRecord>, ParseError> {
        let records: Vec<LogRecord> = LOG_BLOCK
            .captures_iter(content)
            .filter_map(|caps| caps.get(1))
            .enumerate()
            .map(|(idx, block)| {
                let fields = Self::child_fields(block.as_str());
                normalize_fields(&fields, (idx + 1).to_string(), FILE_SOURCE)
            })
            .collect();

        info!("XML parsing complete: {} records", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LogLevel;

    #[test]
    fn test_xml_parse() {
        let data = r#"<?xml version="1.0"?>
<logs>
  <log>
    <timestamp>2024-01-01T00:00:00Z</timestamp>
    <level>warning</level>
    <logger>auth</logger>
    <message>token &lt;expired&gt; &amp; refreshed</message>
  </log>
  <log><msg>second</msg></log>
</logs>"#;

        let records = XmlParser.parse(data).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(records[0].level, LogLevel::Warning);
        assert_eq!(records[0].source, "auth");
        assert_eq!(records[0].message, "token <expired> & refreshed");
        assert_eq!(records[1].message, "second");
        assert_eq!(records[1].id, "2");
    }

    #[test]
    fn test_unclosed_child_is_skipped() {
        let records = XmlParser.parse("<log><message>ok</message><broken></log>").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "ok");
        assert!(records[0].metadata_value("broken").is_none());
    }

    #[test]
    fn test_no_log_blocks() {
        assert!(XmlParser.parse("<root></root>").unwrap().is_empty());
    }
}
