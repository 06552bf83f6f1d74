// Export sinks for annotation rows

pub mod append;
pub mod csv_file;
pub mod json_file;

use serde::{Deserialize, Serialize};

use crate::config::ExportConfig;
use crate::error::Result;
use crate::state::ExportRow;
use crate::utils::expand_path;

pub use append::AppendCsvSink;
pub use csv_file::CsvFileSink;
pub use json_file::JsonFileSink;

/// Durable destination for exported rows.
///
/// `write_rows` either accepts every row or fails as a whole.
pub trait Sink {
    /// Human-readable destination, used in logs and messages.
    fn describe(&self) -> String;

    /// Store `rows` as the current work of `annotator`. Replacing sinks drop
    /// that annotator's earlier rows and keep everyone else's.
    fn write_rows(&mut self, annotator: &str, rows: &[ExportRow]) -> Result<()>;

    /// Rows currently stored at the destination; empty if it does not exist yet.
    fn load_rows(&self) -> Result<Vec<ExportRow>>;

    /// True when `write_rows` adds to existing content instead of replacing it.
    fn appends(&self) -> bool {
        false
    }
}

/// Export format types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Csv,
    Json,
    AppendCsv,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "CSV",
            ExportFormat::Json => "JSON",
            ExportFormat::AppendCsv => "CSV (append)",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv | ExportFormat::AppendCsv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// Build the sink described by `config` for one annotator.
pub fn open_sink(config: &ExportConfig, username: &str) -> Box<dyn Sink> {
    let path = expand_path(&config.path, username);
    match config.format {
        ExportFormat::Csv => Box::new(CsvFileSink::new(path)),
        ExportFormat::Json => Box::new(JsonFileSink::new(path)),
        ExportFormat::AppendCsv => Box::new(AppendCsvSink::new(path)),
    }
}

/// Rows of other annotators from `existing`, followed by `rows`.
pub(crate) fn merge_rows(
    existing: Vec<ExportRow>,
    annotator: &str,
    rows: &[ExportRow],
) -> Vec<ExportRow> {
    existing
        .into_iter()
        .filter(|row| row.username != annotator)
        .chain(rows.iter().cloned())
        .collect()
}

/// Render rows as CSV text with the fixed header.
pub(crate) fn rows_to_csv(rows: &[ExportRow], with_header: bool) -> String {
    let mut out = String::new();
    if with_header {
        out.push_str(&crate::csv::write_record(&ExportRow::HEADER));
    }
    for row in rows {
        out.push_str(&crate::csv::write_record(&row.fields()));
    }
    out
}

/// Parse CSV text produced by `rows_to_csv`.
pub(crate) fn rows_from_csv(text: &str) -> Result<Vec<ExportRow>> {
    let mut records = crate::csv::parse_records(text).into_iter();
    let Some(header) = records.next().map(crate::csv::Header::new) else {
        return Ok(Vec::new());
    };
    for column in ExportRow::HEADER {
        if header.position(column).is_none() {
            return Err(crate::error::AnnotatorError::sink(
                "CSV export",
                format!("missing column '{column}'"),
            ));
        }
    }

    let field = |record: &[String], name: &str| {
        header.get(record, name).unwrap_or_default().to_string()
    };
    Ok(records
        .map(|record| ExportRow {
            username: field(&record, "username"),
            id: field(&record, "id"),
            hate_speech: field(&record, "hate_speech"),
            counter_speech: field(&record, "counter_speech"),
            labels: field(&record, "labels"),
            comment: field(&record, "comment"),
        })
        .collect())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_text_parses_back_to_rows() {
        let rows = test_rows::sample("alice", 3);
        let text = rows_to_csv(&rows, true);
        assert!(text.starts_with("username,id,hate_speech,counter_speech,labels,comment\n"));
        assert_eq!(rows_from_csv(&text).unwrap(), rows);
    }

    #[test]
    fn csv_without_required_columns_is_rejected() {
        assert!(rows_from_csv("username,id\nu,1\n").is_err());
        assert!(rows_from_csv("").unwrap().is_empty());
    }

    #[test]
    fn open_sink_substitutes_username() {
        let config = ExportConfig {
            format: ExportFormat::Json,
            path: "out/{username}.json".into(),
        };
        let sink = open_sink(&config, "bob");
        assert!(sink.describe().contains("out/bob.json"));
        assert!(!sink.appends());
    }
}
