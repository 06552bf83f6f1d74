// Structured-file sink: rows wrapped with an export timestamp.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::{merge_rows, Sink};
use crate::error::{AnnotatorError, Result};
use crate::state::ExportRow;
use crate::utils::write_atomically;

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonExport {
    pub exported_at: String,
    pub rows: Vec<ExportRow>,
}

impl JsonExport {
    pub fn new(rows: Vec<ExportRow>) -> Self {
        Self {
            exported_at: chrono::Local::now().to_rfc3339(),
            rows,
        }
    }
}

/// Rewrites the whole file on every write, keeping other annotators' rows.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for JsonFileSink {
    fn describe(&self) -> String {
        format!("JSON file {}", self.path.display())
    }

    fn write_rows(&mut self, annotator: &str, rows: &[ExportRow]) -> Result<()> {
        let existing = self
            .load_rows()
            .map_err(|e| AnnotatorError::sink(self.describe(), e))?;
        let export = JsonExport::new(merge_rows(existing, annotator, rows));
        let json = serde_json::to_string_pretty(&export)
            .map_err(|e| AnnotatorError::sink(self.describe(), e))?;
        write_atomically(&self.path, json.as_bytes())
            .map_err(|e| AnnotatorError::sink(self.describe(), e))
    }

    /// Accepts the wrapped form or a bare array of rows.
    fn load_rows(&self) -> Result<Vec<ExportRow>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AnnotatorError::io(&self.path, e)),
        };
        if let Ok(export) = serde_json::from_str::<JsonExport>(&text) {
            return Ok(export.rows);
        }
        serde_json::from_str::<Vec<ExportRow>>(&text)
            .map_err(|e| AnnotatorError::sink(self.describe(), format!("parse error: {e}")))
    }
}
