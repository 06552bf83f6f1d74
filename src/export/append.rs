// Append-only tabular sink, shared by every annotator.
//
// Stands in for a remote spreadsheet: each save adds rows to the end of the
// table. Callers must record the annotator as completed after a successful
// append so the same rows are not appended twice.

use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{rows_from_csv, rows_to_csv, Sink};
use crate::error::{AnnotatorError, Result};
use crate::state::ExportRow;

#[derive(Debug, Clone)]
pub struct AppendCsvSink {
    path: PathBuf,
}

impl AppendCsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, rows: &[ExportRow]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.lock_exclusive()?;

        // The whole batch goes out in a single write.
        let result = file.metadata().and_then(|meta| {
            let chunk = rows_to_csv(rows, meta.len() == 0);
            file.write_all(chunk.as_bytes())?;
            file.sync_all()
        });
        let _ = FileExt::unlock(&file);
        result
    }
}

impl Sink for AppendCsvSink {
    fn describe(&self) -> String {
        format!("shared table {}", self.path.display())
    }

    fn write_rows(&mut self, _annotator: &str, rows: &[ExportRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.append(rows)
            .map_err(|e| AnnotatorError::sink(self.describe(), e))
    }

    fn load_rows(&self) -> Result<Vec<ExportRow>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => rows_from_csv(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AnnotatorError::io(&self.path, e)),
        }
    }

    fn appends(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_rows::sample;

    #[test]
    fn appends_keep_a_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = AppendCsvSink::new(dir.path().join("shared.csv"));
        let alice = sample("alice", 2);
        let bob = sample("bob", 1);
        sink.write_rows("alice", &alice).unwrap();
        sink.write_rows("bob", &bob).unwrap();

        let text = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(text.matches("username,id").count(), 1);

        let loaded = sink.load_rows().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[..2], alice[..]);
        assert_eq!(loaded[2], bob[0]);
        assert!(sink.appends());
    }

    #[test]
    fn empty_batches_do_not_create_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = AppendCsvSink::new(dir.path().join("shared.csv"));
        sink.write_rows("alice", &[]).unwrap();
        assert!(!sink.path().exists());
    }
}
