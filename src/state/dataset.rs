//! Dataset loading: the fixed table of cases presented to annotators.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::csv::{parse_records, Header};
use crate::error::{AnnotatorError, Result};
use crate::state::types::{Case, CaseIndex, CaseProvider};

/// Column names used when reading a CSV dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetColumns {
    #[serde(default = "default_id_column")]
    pub id: String,
    #[serde(default = "default_hate_speech_column")]
    pub hate_speech: String,
    #[serde(default = "default_counter_speech_column")]
    pub counter_speech: String,
    #[serde(default = "default_hs_id_column")]
    pub hs_id: String,
    #[serde(default = "default_id_orig_column")]
    pub id_orig: String,
}

fn default_id_column() -> String {
    "id".to_string()
}

fn default_hate_speech_column() -> String {
    "HATE_SPEECH".to_string()
}

fn default_counter_speech_column() -> String {
    "COUNTER_NARRATIVE".to_string()
}

fn default_hs_id_column() -> String {
    "hs_id".to_string()
}

fn default_id_orig_column() -> String {
    "id_orig".to_string()
}

impl Default for DatasetColumns {
    fn default() -> Self {
        Self {
            id: default_id_column(),
            hate_speech: default_hate_speech_column(),
            counter_speech: default_counter_speech_column(),
            hs_id: default_hs_id_column(),
            id_orig: default_id_orig_column(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    Csv,
    Json,
}

impl DatasetFormat {
    /// Guess from the file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DatasetFormat::Json,
            _ => DatasetFormat::Csv,
        }
    }
}

/// Immutable, ordered case table.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    cases: Vec<Case>,
}

impl Dataset {
    pub fn new(cases: Vec<Case>) -> Self {
        Self { cases }
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }
}

impl CaseProvider for Dataset {
    fn case(&self, index: CaseIndex) -> Option<&Case> {
        self.cases.get(index)
    }

    fn len(&self) -> usize {
        self.cases.len()
    }
}

/// Load a dataset file. `format` overrides extension-based detection.
pub fn load_dataset(
    path: &Path,
    format: Option<DatasetFormat>,
    columns: &DatasetColumns,
) -> Result<Dataset> {
    let content = fs::read_to_string(path).map_err(|e| AnnotatorError::io(path, e))?;
    let dataset = match format.unwrap_or_else(|| DatasetFormat::from_path(path)) {
        DatasetFormat::Csv => parse_csv_dataset(&content, columns)?,
        DatasetFormat::Json => parse_json_dataset(&content)?,
    };

    if dataset.is_empty() {
        return Err(AnnotatorError::Dataset(format!(
            "{} contains no cases",
            path.display()
        )));
    }

    tracing::info!(path = %path.display(), cases = dataset.len(), "Loaded dataset");
    Ok(dataset)
}

/// Parse CSV content. Rows without an id column are identified by position.
pub fn parse_csv_dataset(content: &str, columns: &DatasetColumns) -> Result<Dataset> {
    let mut records = parse_records(content).into_iter();
    let header = records
        .next()
        .map(Header::new)
        .ok_or_else(|| AnnotatorError::Dataset("CSV is empty".into()))?;

    for required in [&columns.hate_speech, &columns.counter_speech] {
        if header.position(required).is_none() {
            return Err(AnnotatorError::Dataset(format!(
                "missing required column '{required}'"
            )));
        }
    }

    let optional = |record: &[String], name: &str| {
        header
            .get(record, name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };

    let cases = records
        .enumerate()
        .map(|(row, record)| Case {
            id: optional(&record, &columns.id).unwrap_or_else(|| row.to_string()),
            hate_speech: header
                .get(&record, &columns.hate_speech)
                .unwrap_or_default()
                .to_string(),
            counter_speech: header
                .get(&record, &columns.counter_speech)
                .unwrap_or_default()
                .to_string(),
            hs_id: optional(&record, &columns.hs_id),
            id_orig: optional(&record, &columns.id_orig),
        })
        .collect();

    Ok(Dataset::new(cases))
}

/// Parse a JSON array of case objects.
pub fn parse_json_dataset(content: &str) -> Result<Dataset> {
    let cases: Vec<Case> = serde_json::from_str(content)
        .map_err(|e| AnnotatorError::Dataset(format!("Failed to parse dataset JSON: {e}")))?;
    Ok(Dataset::new(cases))
}
