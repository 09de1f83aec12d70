use crate::stream::StreamStatus;
use log_parser::{get_date_range, get_sources, get_statistics, DateRange, LogRecord, Statistics};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub filename: String,
    pub total: usize,
}

/// Summary of an uploaded record set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    pub session_id: String,
    pub filename: String,
    pub created_at: String,
    pub total: usize,
    pub statistics: Statistics,
    pub sources: Vec<String>,
    pub date_range: Option<DateRange>,
}

impl SessionMeta {
    pub fn collect(session_id: &str, filename: &str, created_at: &str, records: &[LogRecord]) -> Self {
        Self {
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            created_at: created_at.to_string(),
            total: records.len(),
            statistics: get_statistics(records),
            sources: get_sources(records),
            date_range: get_date_range(records),
        }
    }
}

/// Filtered records plus counts over just those records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub records: Vec<LogRecord>,
    pub statistics: Statistics,
}

impl From<Vec<LogRecord>> for SearchResponse {
    fn from(records: Vec<LogRecord>) -> Self {
        let statistics = get_statistics(&records);
        Self { records, statistics }
    }
}

/// Live window search result, with the stream status at query time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSearchResponse {
    #[serde(flatten)]
    pub result: SearchResponse,
    pub sources: Vec<String>,
    pub status: StreamStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Arrow,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Arrow => "application/vnd.apache.arrow.stream",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
            ExportFormat::Arrow => "arrow",
        }
    }
}
