use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{AnnotatorError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDefinition {
    pub name: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// Ordered catalogue of permissible strategy labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    labels: Vec<LabelDefinition>,
}

impl LabelSet {
    /// Build a label set, rejecting empty, duplicate, or comma-bearing names.
    pub fn new(labels: Vec<LabelDefinition>) -> Result<Self> {
        if labels.is_empty() {
            return Err(AnnotatorError::Labels("label set is empty".into()));
        }
        let mut seen = HashSet::new();
        for label in &labels {
            let name = label.name.trim();
            if name.is_empty() {
                return Err(AnnotatorError::Labels("label with empty name".into()));
            }
            if name.contains(',') {
                return Err(AnnotatorError::Labels(format!(
                    "label '{name}' contains a comma"
                )));
            }
            if !seen.insert(name.to_string()) {
                return Err(AnnotatorError::Labels(format!("duplicate label '{name}'")));
            }
        }
        Ok(Self { labels })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelDefinition> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Look up a label by its 1-based menu number.
    pub fn by_number(&self, number: usize) -> Option<&LabelDefinition> {
        number.checked_sub(1).and_then(|i| self.labels.get(i))
    }

    /// Resolve user input that is either a menu number or an exact label name.
    pub fn resolve<'a>(&'a self, input: &'a str) -> &'a str {
        let input = input.trim();
        match input.parse::<usize>().ok().and_then(|n| self.by_number(n)) {
            Some(def) => def.name.as_str(),
            None => input,
        }
    }

    /// Guideline reference text, one strategy per paragraph.
    pub fn guidelines(&self) -> String {
        let mut out = String::from("Counterspeech Annotation Guidelines\n");
        for (i, label) in self.labels.iter().enumerate() {
            out.push_str(&format!("\n{}. {}: {}", i + 1, label.name, label.explanation));
            if let Some(example) = &label.example {
                out.push_str(&format!("\n   e.g. {example}"));
            }
        }
        out.push('\n');
        out
    }
}

#[derive(Debug, Deserialize)]
struct LabelFile {
    labels: Vec<LabelDefinition>,
}

/// Load the label set.
///
/// An explicit path must exist and parse. Without one the search order is
/// `./labels.yaml`, `~/.config/cs-annotator/labels.yaml`, then the bundled
/// taxonomy.
pub fn load_labels(path: Option<&str>) -> Result<LabelSet> {
    if let Some(p) = path {
        let expanded = shellexpand::tilde(p);
        return try_load_label_file(Path::new(expanded.as_ref()));
    }

    for candidate in ["./labels.yaml", "~/.config/cs-annotator/labels.yaml"] {
        let expanded = shellexpand::tilde(candidate);
        let path_obj = Path::new(expanded.as_ref());
        if !path_obj.exists() {
            continue;
        }
        match try_load_label_file(path_obj) {
            Ok(set) => return Ok(set),
            Err(e) => tracing::warn!(path = %path_obj.display(), error = %e, "Skipping label file"),
        }
    }

    default_labels()
}

/// The bundled counter-speech taxonomy.
pub fn default_labels() -> Result<LabelSet> {
    parse_label_content(include_str!("../labels.yaml"))
}

fn try_load_label_file(path: &Path) -> Result<LabelSet> {
    let content =
        std::fs::read_to_string(path).map_err(|e| AnnotatorError::io(path, e))?;
    parse_label_content(&content)
}

/// Accepts either `labels: [...]` or a bare list of definitions.
fn parse_label_content(content: &str) -> Result<LabelSet> {
    if let Ok(list) = serde_yaml::from_str::<Vec<LabelDefinition>>(content) {
        return LabelSet::new(list);
    }
    let file: LabelFile = serde_yaml::from_str(content)
        .map_err(|e| AnnotatorError::Labels(format!("yaml parse error: {e}")))?;
    LabelSet::new(file.labels)
}
