//! JSON Lines export of trace records.

use super::record::TraceRecord;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Errors raised while encoding or decoding trace JSONL.
#[derive(Debug, Error)]
pub enum TraceJsonlError {
    /// A record could not be encoded or a line could not be parsed.
    #[error("failed to process trace JSONL line {line}: {source}")]
    Json {
        /// The 1-based line number.
        line: usize,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing failed.
    #[error("trace JSONL I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encodes one record as a newline-terminated JSON line.
pub fn encode_trace_jsonl_line(record: &TraceRecord) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    Ok(line)
}

/// Parses one JSON line into a record.
pub fn parse_trace_jsonl_line(line: &str) -> serde_json::Result<TraceRecord> {
    serde_json::from_str::<TraceRecord>(line.trim_end())
}

/// Writes records to `writer`, one per line.
pub fn write_trace_jsonl<W: Write>(records: &[TraceRecord], writer: W) -> Result<(), TraceJsonlError> {
    let mut writer = BufWriter::new(writer);
    for (index, record) in records.iter().enumerate() {
        let line = encode_trace_jsonl_line(record).map_err(|source| TraceJsonlError::Json {
            line: index + 1,
            source,
        })?;
        writer.write_all(line.as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads records from `reader`, skipping blank lines.
pub fn read_trace_jsonl<R: BufRead>(reader: R) -> Result<Vec<TraceRecord>, TraceJsonlError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = parse_trace_jsonl_line(&line).map_err(|source| TraceJsonlError::Json {
            line: index + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Exports records to a file, replacing its contents.
pub fn export_trace_jsonl(records: &[TraceRecord], path: impl AsRef<Path>) -> Result<(), TraceJsonlError> {
    write_trace_jsonl(records, File::create(path)?)
}

/// Imports records from a file.
pub fn import_trace_jsonl(path: impl AsRef<Path>) -> Result<Vec<TraceRecord>, TraceJsonlError> {
    read_trace_jsonl(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SerializedError;
    use crate::pipeline::{InstanceId, PositionPath};
    use crate::trace::TraceOutcome;
    use serde_json::json;
    use uuid::Uuid;

    fn record(instance: &str, outcome: TraceOutcome) -> TraceRecord {
        TraceRecord {
            run_id: Uuid::now_v7(),
            root_run_id: None,
            owner: "mod-1".into(),
            instance_id: InstanceId::from(instance),
            brick_id: "@brickflow/echo".into(),
            position: PositionPath::root().child_index(0).child_field("if").child_index(1),
            branches: vec![],
            rendered_args: json!({"message": "hi"}),
            config_hash: "h".into(),
            started_at: crate::utils::now_utc(),
            ended_at: None,
            outcome,
        }
    }

    #[test]
    fn test_line_is_newline_terminated() {
        let line = encode_trace_jsonl_line(&record("a", TraceOutcome::Running)).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_export_and_import_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        let records = vec![
            record("a", TraceOutcome::Succeeded { output: json!([1, 2]) }),
            record(
                "b",
                TraceOutcome::Failed {
                    error: SerializedError {
                        name: "BrickExecutionError".into(),
                        message: "boom".into(),
                        property: None,
                        brick_id: Some("@acme/throw".into()),
                        instance_id: Some("b".into()),
                    },
                },
            ),
        ];

        export_trace_jsonl(&records, &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);

        let imported = import_trace_jsonl(&path).unwrap();
        assert_eq!(imported, records);
    }

    #[test]
    fn test_bad_line_reports_number() {
        let input = format!(
            "{}\nnot json\n",
            serde_json::to_string(&record("a", TraceOutcome::Running)).unwrap()
        );
        let err = read_trace_jsonl(input.as_bytes()).unwrap_err();
        assert!(matches!(err, TraceJsonlError::Json { line: 2, .. }));
    }
}
