use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{AnnotatorError, Result};
use crate::export::ExportFormat;
use crate::state::{DatasetColumns, DatasetFormat};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub assignment: AssignmentConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_path")]
    pub path: String,
    /// Overrides detection from the file extension.
    #[serde(default)]
    pub format: Option<DatasetFormat>,
    #[serde(default)]
    pub columns: DatasetColumns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
    /// Labels allowed per case; 0 means unlimited, 1 is single-select.
    #[serde(default = "default_max_selections")]
    pub max_selections: usize,
    #[serde(default)]
    pub labels_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Every annotator sees the whole dataset.
    #[default]
    All,
    /// Fixed username -> range table.
    Static,
    /// Round-robin buckets persisted to the assignment table.
    Buckets,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentConfig {
    #[serde(default)]
    pub mode: AssignmentMode,
    #[serde(default = "default_cases_per_bucket")]
    pub cases_per_bucket: usize,
    #[serde(default = "default_max_buckets")]
    pub max_buckets: usize,
    #[serde(default = "default_max_occupancy")]
    pub max_occupancy: usize,
    #[serde(default = "default_table_path")]
    pub table_path: String,
    #[serde(default)]
    pub completed_path: Option<String>,
    /// Username -> `[start, end)` for `mode = "static"`.
    #[serde(default)]
    pub ranges: BTreeMap<String, [usize; 2]>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_format")]
    pub format: ExportFormat,
    /// `{username}` is replaced with the annotator's name.
    #[serde(default = "default_export_path")]
    pub path: String,
}

// Default value functions
fn default_dataset_path() -> String {
    "dataset.csv".to_string()
}

fn default_items_per_page() -> usize {
    10
}

fn default_max_selections() -> usize {
    2
}

fn default_cases_per_bucket() -> usize {
    5
}

fn default_max_buckets() -> usize {
    20
}

fn default_max_occupancy() -> usize {
    2
}

fn default_table_path() -> String {
    "user_sets.csv".to_string()
}

fn default_export_format() -> ExportFormat {
    ExportFormat::Csv
}

fn default_export_path() -> String {
    "annotations_{username}.csv".to_string()
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            format: None,
            columns: DatasetColumns::default(),
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            items_per_page: default_items_per_page(),
            max_selections: default_max_selections(),
            labels_file: None,
        }
    }
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            mode: AssignmentMode::default(),
            cases_per_bucket: default_cases_per_bucket(),
            max_buckets: default_max_buckets(),
            max_occupancy: default_max_occupancy(),
            table_path: default_table_path(),
            completed_path: None,
            ranges: BTreeMap::new(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: default_export_format(),
            path: default_export_path(),
        }
    }
}

impl AppConfig {
    /// Reject values the rest of the crate cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.annotation.items_per_page == 0 {
            return Err(AnnotatorError::Config("items_per_page must be at least 1".into()));
        }
        let a = &self.assignment;
        if a.mode == AssignmentMode::Buckets
            && (a.cases_per_bucket == 0 || a.max_buckets == 0 || a.max_occupancy == 0)
        {
            return Err(AnnotatorError::Config(
                "cases_per_bucket, max_buckets and max_occupancy must be at least 1".into(),
            ));
        }
        if let Some((user, [start, end])) = a.ranges.iter().find(|(_, [s, e])| s > e) {
            return Err(AnnotatorError::Config(format!(
                "range for '{user}' is inverted ({start}..{end})"
            )));
        }
        if self.export.format == ExportFormat::AppendCsv && a.completed_path.is_none() {
            return Err(AnnotatorError::Config(
                "export format append_csv needs assignment.completed_path".into(),
            ));
        }
        Ok(())
    }
}

/// Default location of the config file in the platform config directory.
pub fn config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "cs-annotator")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file yields defaults; an unreadable or invalid one is an error.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_path) else {
        tracing::debug!("No config directory available; using defaults");
        return Ok(AppConfig::default());
    };
    if !path.exists() {
        tracing::info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|e| AnnotatorError::io(&path, e))?;
    let config: AppConfig = toml::from_str(&content)
        .map_err(|e| AnnotatorError::Config(format!("{}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AnnotatorError::io(parent, e))?;
    }

    let toml = toml::to_string_pretty(config)
        .map_err(|e| AnnotatorError::Config(format!("Failed to serialize config: {e}")))?;

    std::fs::write(path, toml).map_err(|e| AnnotatorError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.annotation.items_per_page, 10);
        assert_eq!(config.annotation.max_selections, 2);
        assert_eq!(config.assignment.cases_per_bucket, 5);
        assert_eq!(config.assignment.max_buckets, 20);
        assert_eq!(config.assignment.max_occupancy, 2);
        assert_eq!(config.export.format, ExportFormat::Csv);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [assignment]
            mode = "static"
            ranges = { alice = [0, 50], bob = [50, 100] }

            [export]
            format = "append_csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.assignment.mode, AssignmentMode::Static);
        assert_eq!(config.assignment.ranges["bob"], [50, 100]);
        assert_eq!(config.assignment.max_occupancy, 2);
        assert_eq!(config.export.format, ExportFormat::AppendCsv);
        assert_eq!(config.export.path, "annotations_{username}.csv");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("config.toml");
        let mut config = AppConfig::default();
        config.annotation.items_per_page = 5;
        config.assignment.mode = AssignmentMode::Buckets;
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), config);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn append_export_requires_a_completed_registry() {
        let mut config = AppConfig::default();
        config.export.format = ExportFormat::AppendCsv;
        assert!(matches!(config.validate(), Err(AnnotatorError::Config(_))));

        config.assignment.completed_path = Some("completed.csv".into());
        assert!(config.validate().is_ok());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("append.toml");
        std::fs::write(&path, "[export]\nformat = \"append_csv\"\n").unwrap();
        assert!(matches!(
            load_config(Some(&path)).unwrap_err(),
            AnnotatorError::Config(_)
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[annotation]\nitems_per_page = 0\n").unwrap();
        assert!(matches!(
            load_config(Some(&path)).unwrap_err(),
            AnnotatorError::Config(_)
        ));
    }
}
