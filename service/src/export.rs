use crate::models::ExportFormat;
use arrow::array::{ArrayRef, BooleanArray, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use log_parser::timestamp::parse_timestamp;
use log_parser::LogRecord;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Arrow export failed: {0}")]
    Arrow(#[from] ArrowError),
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn export(records: &[LogRecord], format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_vec(records)?),
        ExportFormat::Csv => write_csv(records),
        ExportFormat::Arrow => write_arrow(records),
    }
}

pub fn get_arrow_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("ts_ns", DataType::Int64, true),
        Field::new("level", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("message", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, true),
        Field::new("timestamp_inferred", DataType::Boolean, false),
    ]))
}

/// Column buffers for one record batch.
#[derive(Default)]
pub struct ArrowBuilder {
    id: Vec<String>,
    timestamp: Vec<String>,
    ts_ns: Vec<Option<i64>>,
    level: Vec<&'static str>,
    source: Vec<String>,
    message: Vec<String>,
    metadata: Vec<Option<String>>,
    timestamp_inferred: Vec<bool>,
}

impl ArrowBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: Vec::with_capacity(capacity),
            timestamp: Vec::with_capacity(capacity),
            ts_ns: Vec::with_capacity(capacity),
            level: Vec::with_capacity(capacity),
            source: Vec::with_capacity(capacity),
            message: Vec::with_capacity(capacity),
            metadata: Vec::with_capacity(capacity),
            timestamp_inferred: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: &LogRecord) {
        self.id.push(record.id.clone());
        self.timestamp.push(record.timestamp.clone());
        self.ts_ns
            .push(parse_timestamp(&record.timestamp).and_then(|dt| dt.timestamp_nanos_opt()));
        self.level.push(record.level.as_str());
        self.source.push(record.source.clone());
        self.message.push(record.message.clone());
        self.metadata.push(
            record
                .metadata
                .as_ref()
                .and_then(|m| serde_json::to_string(m).ok()),
        );
        self.timestamp_inferred.push(record.timestamp_inferred);
    }

    pub fn build_batch(self) -> Result<RecordBatch, ArrowError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(self.id)),
            Arc::new(StringArray::from(self.timestamp)),
            Arc::new(Int64Array::from(self.ts_ns)),
            Arc::new(StringArray::from(self.level)),
            Arc::new(StringArray::from(self.source)),
            Arc::new(StringArray::from(self.message)),
            Arc::new(StringArray::from(self.metadata)),
            Arc::new(BooleanArray::from(self.timestamp_inferred)),
        ];

        RecordBatch::try_new(get_arrow_schema(), columns)
    }
}

/// Arrow IPC stream holding every record in a single batch.
pub fn write_arrow(records: &[LogRecord]) -> Result<Vec<u8>, ExportError> {
    let mut builder = ArrowBuilder::with_capacity(records.len());
    for record in records {
        builder.push(record);
    }
    let batch = builder.build_batch()?;

    let mut buffer = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buffer, &batch.schema())?;
        writer.write(&batch)?;
        writer.finish()?;
    }
    Ok(buffer)
}

/// CSV with the canonical field names as header, so the file re-imports
/// to the same records.
pub fn write_csv(records: &[LogRecord]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["id", "timestamp", "level", "source", "message"])?;
    for record in records {
        writer.write_record([
            record.id.as_str(),
            record.timestamp.as_str(),
            record.level.as_str(),
            record.source.as_str(),
            record.message.as_str(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(csv::Error::from(e.into_error())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use arrow::ipc::reader::StreamReader;
    use log_parser::LogLevel;
    use std::io::Cursor;

    fn sample() -> Vec<LogRecord> {
        log_parser::parse(
            r#"[
                {"timestamp":"2024-01-01T00:00:00Z","level":"error","source":"db","message":"lost, then \"found\""},
                {"timestamp":"not a date","level":"debug","message":"second"}
            ]"#,
            "sample.json",
        )
    }

    #[test]
    fn test_csv_export_reimports() {
        let records = sample();
        let bytes = write_csv(&records).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("id,timestamp,level,source,message\n"));

        let reparsed = log_parser::parse(&text, "export.csv");
        assert_eq!(reparsed.len(), records.len());
        for (a, b) in reparsed.iter().zip(records.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.level, b.level);
            assert_eq!(a.source, b.source);
            assert_eq!(a.message, b.message);
        }
    }

    #[test]
    fn test_arrow_export() {
        let records = sample();
        let bytes = write_arrow(&records).unwrap();

        let reader = StreamReader::try_new(Cursor::new(bytes), None).unwrap();
        let batches: Vec<RecordBatch> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 2);

        let level = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(level.value(0), LogLevel::Error.as_str());
        assert_eq!(level.value(1), "DEBUG");

        let ts_ns = batch.column(2).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ts_ns.value(0), 1_704_067_200_000_000_000);

        let inferred = batch.column(7).as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(!inferred.value(0));
        assert!(inferred.value(1));
    }

    #[test]
    fn test_json_export() {
        let records = sample();
        let bytes = export(&records, ExportFormat::Json).unwrap();
        let back: Vec<LogRecord> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_empty_exports() {
        assert!(write_arrow(&[]).is_ok());
        assert_eq!(write_csv(&[]).unwrap(), b"id,timestamp,level,source,message\n");
    }
}
