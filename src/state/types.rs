use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Zero-based position of a case in the full dataset.
pub type CaseIndex = usize;

/// One hate speech / counter speech pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    #[serde(alias = "HATE_SPEECH")]
    pub hate_speech: String,
    #[serde(alias = "COUNTER_NARRATIVE")]
    pub counter_speech: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hs_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_orig: Option<String>,
}

/// Indexed access to the case table.
pub trait CaseProvider {
    fn case(&self, index: CaseIndex) -> Option<&Case>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the case with the given identifier, if any.
    fn index_of(&self, id: &str) -> Option<CaseIndex> {
        (0..self.len()).find(|&i| self.case(i).is_some_and(|c| c.id == id))
    }
}

/// An annotator's selection and comment for one case.
///
/// `labels` keeps insertion order and never holds duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Annotation {
    pub const EMPTY: Annotation = Annotation {
        labels: Vec::new(),
        comment: None,
    };

    pub fn is_complete(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn joined_labels(&self) -> String {
        self.labels.join(",")
    }
}

/// Maximum number of labels one case may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionLimit {
    #[default]
    Unlimited,
    AtMost(usize),
}

impl SelectionLimit {
    /// `0` means unlimited.
    pub fn from_config(max: usize) -> Self {
        match max {
            0 => SelectionLimit::Unlimited,
            n => SelectionLimit::AtMost(n),
        }
    }

    pub fn allows(&self, count: usize) -> bool {
        match self {
            SelectionLimit::Unlimited => true,
            SelectionLimit::AtMost(n) => count <= *n,
        }
    }

    pub fn is_single_select(&self) -> bool {
        matches!(self, SelectionLimit::AtMost(1))
    }
}

/// One exported line. Every sink accepts this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub username: String,
    pub id: String,
    pub hate_speech: String,
    pub counter_speech: String,
    pub labels: String,
    pub comment: String,
}

impl ExportRow {
    pub const HEADER: [&'static str; 6] = [
        "username",
        "id",
        "hate_speech",
        "counter_speech",
        "labels",
        "comment",
    ];

    pub fn fields(&self) -> [&str; 6] {
        [
            &self.username,
            &self.id,
            &self.hate_speech,
            &self.counter_speech,
            &self.labels,
            &self.comment,
        ]
    }

    pub fn label_list(&self) -> Vec<&str> {
        self.labels
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Completed vs total cases over a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Completion ratio in `[0, 1]`; an empty range reports 0.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_done(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} / {} ({:.0}%)",
            self.completed,
            self.total,
            self.ratio() * 100.0
        )
    }
}

/// Clip `range` to `0..len`.
pub fn clamp_range(range: Range<CaseIndex>, len: usize) -> Range<CaseIndex> {
    let end = range.end.min(len);
    range.start.min(end)..end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_progress_ratio_is_zero() {
        let p = Progress {
            completed: 0,
            total: 0,
        };
        assert_eq!(p.ratio(), 0.0);
        assert!(!p.is_done());
    }

    #[test]
    fn selection_limit_allows_up_to_cap() {
        let limit = SelectionLimit::AtMost(2);
        assert!(limit.allows(2));
        assert!(!limit.allows(3));
        assert!(SelectionLimit::Unlimited.allows(100));
        assert!(SelectionLimit::from_config(1).is_single_select());
        assert_eq!(SelectionLimit::from_config(0), SelectionLimit::Unlimited);
    }

    #[test]
    fn export_row_label_list_skips_blanks() {
        let row = ExportRow {
            username: "u".into(),
            id: "1".into(),
            hate_speech: String::new(),
            counter_speech: String::new(),
            labels: "Denouncing, Fact-Checking,".into(),
            comment: String::new(),
        };
        assert_eq!(row.label_list(), vec!["Denouncing", "Fact-Checking"]);
    }

    #[test]
    fn clamp_range_stays_in_bounds() {
        assert_eq!(clamp_range(10..20, 15), 10..15);
        assert_eq!(clamp_range(20..30, 15), 15..15);
    }
}
