//! Export sinks
//!
//! CSV output streams rows as they arrive. JSON output is a single array of row objects,
//! so it is materialized before writing.

use crate::error::{ExportError, Result};
use crate::features::ExportSchema;
use crate::flattener::ExportRow;
use futures::{Stream, StreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// Format implied by a file extension (`.csv`, `.json`)
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Text of one CSV cell: null is empty, strings are raw, arrays and objects are JSON
fn cell(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)?,
    })
}

/// Write a header row then every row; returns the number of data rows written
pub async fn write_csv<W, S>(schema: &ExportSchema, rows: S, writer: W) -> Result<usize>
where
    W: Write,
    S: Stream<Item = Result<ExportRow>>,
{
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(schema.columns())?;

    let mut rows = std::pin::pin!(rows);
    let mut written = 0;
    while let Some(row) = rows.next().await {
        let row = row?;
        let record = row.values.iter().map(cell).collect::<Result<Vec<_>>>()?;
        csv.write_record(&record)?;
        written += 1;
    }

    csv.flush()?;
    Ok(written)
}

struct RowObject<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Write every row as a JSON array of objects keyed by column, in column order
pub async fn write_json<W, S>(schema: &ExportSchema, rows: S, mut writer: W) -> Result<usize>
where
    W: Write,
    S: Stream<Item = Result<ExportRow>>,
{
    let rows: Vec<ExportRow> = rows
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_>>()?;

    let objects: Vec<RowObject<'_>> = rows
        .iter()
        .map(|row| RowObject {
            columns: schema.columns(),
            values: &row.values,
        })
        .collect();

    serde_json::to_writer_pretty(&mut writer, &objects)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn schema() -> ExportSchema {
        ExportSchema::build(&["title", "authors"], &["key"]).unwrap()
    }

    fn rows() -> Vec<Result<ExportRow>> {
        vec![
            Ok(ExportRow {
                values: vec![json!("Paper, with comma"), json!("A/B"), json!(12), json!("github/o/r")],
            }),
            Ok(ExportRow {
                values: vec![json!("Other"), json!(""), Value::Null, json!([[0, 1]])],
            }),
        ]
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out/table.CSV")), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_path(Path::new("table.json")), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_path(Path::new("table")), None);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }

    #[tokio::test]
    async fn test_csv_output() {
        let mut out = Vec::new();
        let written = write_csv(&schema(), stream::iter(rows()), &mut out).await.unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "title,authors,citations,key");
        assert_eq!(lines[1], "\"Paper, with comma\",A/B,12,github/o/r");
        assert_eq!(lines[2], "Other,,,\"[[0,1]]\"");
    }

    #[tokio::test]
    async fn test_json_output_keeps_column_order() {
        let mut out = Vec::new();
        let written = write_json(&schema(), stream::iter(rows()), &mut out).await.unwrap();
        assert_eq!(written, 2);

        let text = String::from_utf8(out).unwrap();
        let title = text.find("\"title\"").unwrap();
        let citations = text.find("\"citations\"").unwrap();
        let key = text.find("\"key\"").unwrap();
        assert!(title < citations && citations < key);

        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[1]["citations"], Value::Null);
        assert_eq!(parsed[1]["key"], json!([[0, 1]]));
    }

    #[tokio::test]
    async fn test_stream_error_aborts_write() {
        let failing = vec![
            Ok(ExportRow { values: vec![Value::Null; 4] }),
            Err(ExportError::InvalidSchema("boom".to_string())),
        ];
        let mut out = Vec::new();
        assert!(write_csv(&schema(), stream::iter(failing), &mut out).await.is_err());
    }
}
