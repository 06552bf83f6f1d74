// Delimited-file sink: one row per labelled case under a fixed header.

use std::fs;
use std::path::{Path, PathBuf};

use super::{merge_rows, rows_from_csv, rows_to_csv, Sink};
use crate::error::{AnnotatorError, Result};
use crate::state::ExportRow;
use crate::utils::write_atomically;

/// Rewrites the whole file on every write, keeping other annotators' rows.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for CsvFileSink {
    fn describe(&self) -> String {
        format!("CSV file {}", self.path.display())
    }

    fn write_rows(&mut self, annotator: &str, rows: &[ExportRow]) -> Result<()> {
        let existing = self
            .load_rows()
            .map_err(|e| AnnotatorError::sink(self.describe(), e))?;
        let merged = merge_rows(existing, annotator, rows);
        write_atomically(&self.path, rows_to_csv(&merged, true).as_bytes())
            .map_err(|e| AnnotatorError::sink(self.describe(), e))
    }

    fn load_rows(&self) -> Result<Vec<ExportRow>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => rows_from_csv(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AnnotatorError::io(&self.path, e)),
        }
    }
}
