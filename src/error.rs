//! Error and warning types shared across the annotator.
//!
//! Fatal conditions are `AnnotatorError` values. Conditions the annotator
//! should merely be told about (too many labels, unfinished page) are
//! `Warning` values carried inside successful outcomes.

use std::path::PathBuf;

use crate::state::CaseIndex;

pub type Result<T> = std::result::Result<T, AnnotatorError>;

#[derive(Debug, thiserror::Error)]
pub enum AnnotatorError {
    #[error("Label '{label}' is not part of the active label set")]
    InvalidLabel { label: String },

    #[error("No bucket has spare capacity ({max_buckets} buckets, {max_occupancy} annotators each)")]
    NoCapacity {
        max_buckets: usize,
        max_occupancy: usize,
    },

    #[error("Username '{0}' has no assigned range")]
    UnrecognizedIdentifier(String),

    #[error("Username '{0}' has already submitted annotations")]
    AlreadyCompleted(String),

    #[error("Only {completed} / {total} pairs are labelled; label every pair before submitting")]
    IncompleteSubmission { completed: usize, total: usize },

    #[error("Case {0} is not present in the dataset")]
    CaseNotFound(CaseIndex),

    #[error("Failed to persist to {target}: {reason}")]
    Sink { target: String, reason: String },

    #[error("Table {path} is malformed: {reason}")]
    MalformedTable { path: PathBuf, reason: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Label set error: {0}")]
    Labels(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnnotatorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn sink(target: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Sink {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Non-fatal condition surfaced to the annotator. The rejected action has
/// not been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    SelectionLimitExceeded { limit: usize },
    IncompletePage { missing: Vec<CaseIndex> },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::SelectionLimitExceeded { limit } => {
                write!(f, "At most {limit} strategies can be selected per pair")
            }
            Warning::IncompletePage { missing } => {
                let pairs: Vec<String> = missing.iter().map(|i| (i + 1).to_string()).collect();
                write!(
                    f,
                    "Please label every pair on this page first (missing: {})",
                    pairs.join(", ")
                )
            }
        }
    }
}
