//! Per-session annotation store.
//!
//! Owns the `CaseIndex -> Annotation` mapping for one annotator. Reads of an
//! index that was never touched behave as an empty annotation. Rejected
//! mutations never partially apply.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::{AnnotatorError, Result, Warning};
use crate::export::Sink;
use crate::labels::LabelSet;
use crate::state::types::{Annotation, CaseIndex, CaseProvider, ExportRow, Progress, SelectionLimit};

static EMPTY_ANNOTATION: Annotation = Annotation::EMPTY;

/// Result of a toggle that passed label validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    Rejected(Warning),
}

#[derive(Debug, Clone)]
pub struct AnnotationStore {
    annotator: String,
    labels: LabelSet,
    limit: SelectionLimit,
    annotations: BTreeMap<CaseIndex, Annotation>,
}

impl AnnotationStore {
    pub fn new(annotator: impl Into<String>, labels: LabelSet, limit: SelectionLimit) -> Self {
        Self {
            annotator: annotator.into(),
            labels,
            limit,
            annotations: BTreeMap::new(),
        }
    }

    pub fn annotator(&self) -> &str {
        &self.annotator
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn limit(&self) -> SelectionLimit {
        self.limit
    }

    /// Current selection and comment for a case; empty if never touched.
    pub fn annotation(&self, index: CaseIndex) -> &Annotation {
        self.annotations.get(&index).unwrap_or(&EMPTY_ANNOTATION)
    }

    fn ensure_label(&self, label: &str) -> Result<()> {
        if self.labels.contains(label) {
            Ok(())
        } else {
            Err(AnnotatorError::InvalidLabel {
                label: label.to_string(),
            })
        }
    }

    /// Add `label` if absent, remove it if present.
    ///
    /// Adding past the selection limit is refused with a warning and leaves
    /// the selection as it was.
    pub fn toggle_label(&mut self, index: CaseIndex, label: &str) -> Result<ToggleOutcome> {
        self.ensure_label(label)?;

        let current = self.annotation(index);
        if current.has_label(label) {
            let entry = self.annotations.entry(index).or_default();
            entry.labels.retain(|l| l != label);
            tracing::debug!(case = index, label, "Label removed");
            return Ok(ToggleOutcome::Removed);
        }

        if !self.limit.allows(current.labels.len() + 1) {
            let limit = match self.limit {
                SelectionLimit::AtMost(n) => n,
                SelectionLimit::Unlimited => usize::MAX,
            };
            tracing::debug!(case = index, label, limit, "Selection limit reached");
            return Ok(ToggleOutcome::Rejected(Warning::SelectionLimitExceeded {
                limit,
            }));
        }

        self.annotations
            .entry(index)
            .or_default()
            .labels
            .push(label.to_string());
        tracing::debug!(case = index, label, "Label added");
        Ok(ToggleOutcome::Added)
    }

    /// Replace the selection with exactly `label` (single-select widgets).
    pub fn select_label(&mut self, index: CaseIndex, label: &str) -> Result<()> {
        self.ensure_label(label)?;
        let entry = self.annotations.entry(index).or_default();
        entry.labels.clear();
        entry.labels.push(label.to_string());
        Ok(())
    }

    /// Empty the selection, keeping any comment.
    pub fn clear_labels(&mut self, index: CaseIndex) {
        if let Some(entry) = self.annotations.get_mut(&index) {
            entry.labels.clear();
        }
    }

    /// Overwrite the comment. An empty string clears it.
    pub fn set_comment(&mut self, index: CaseIndex, text: impl Into<String>) {
        let text = text.into();
        let entry = self.annotations.entry(index).or_default();
        entry.comment = if text.is_empty() { None } else { Some(text) };
    }

    pub fn is_case_complete(&self, index: CaseIndex) -> bool {
        self.annotation(index).is_complete()
    }

    pub fn compute_progress(&self, range: Range<CaseIndex>) -> Progress {
        let total = range.len();
        let completed = range.filter(|&i| self.is_case_complete(i)).count();
        Progress { completed, total }
    }

    /// Indices in `range` that still lack a label.
    pub fn incomplete_cases(&self, range: Range<CaseIndex>) -> Vec<CaseIndex> {
        range.filter(|&i| !self.is_case_complete(i)).collect()
    }

    pub fn can_advance_page(&self, page: Range<CaseIndex>) -> bool {
        page.into_iter().all(|i| self.is_case_complete(i))
    }

    /// Rows for every labelled case, in ascending case order.
    pub fn export_all<P: CaseProvider + ?Sized>(&self, cases: &P) -> Result<Vec<ExportRow>> {
        self.annotations
            .iter()
            .filter(|(_, ann)| ann.is_complete())
            .map(|(&index, ann)| {
                let case = cases
                    .case(index)
                    .ok_or(AnnotatorError::CaseNotFound(index))?;
                Ok(ExportRow {
                    username: self.annotator.clone(),
                    id: case.id.clone(),
                    hate_speech: case.hate_speech.clone(),
                    counter_speech: case.counter_speech.clone(),
                    labels: ann.joined_labels(),
                    comment: ann.comment.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Hand rows to a sink. Failures are returned; the store is untouched.
    pub fn persist(&self, rows: &[ExportRow], sink: &mut dyn Sink) -> Result<()> {
        sink.write_rows(&self.annotator, rows)?;
        tracing::info!(
            annotator = %self.annotator,
            rows = rows.len(),
            target = %sink.describe(),
            "Annotations persisted"
        );
        Ok(())
    }

    /// Rebuild annotations from rows previously persisted by this annotator.
    ///
    /// Rows for other annotators or unknown case ids are skipped, as are
    /// labels no longer in the label set. Returns the number of cases restored.
    pub fn restore<P: CaseProvider + ?Sized>(&mut self, rows: &[ExportRow], cases: &P) -> usize {
        let annotator = self.annotator.clone();
        let mut restored = 0;
        for row in rows.iter().filter(|r| r.username == annotator) {
            let Some(index) = cases.index_of(&row.id) else {
                tracing::warn!(case_id = %row.id, "Skipping row for unknown case");
                continue;
            };

            let mut annotation = Annotation::default();
            for label in row.label_list() {
                if !self.labels.contains(label) {
                    tracing::warn!(case_id = %row.id, label, "Skipping unknown label");
                    continue;
                }
                if annotation.has_label(label) || !self.limit.allows(annotation.labels.len() + 1) {
                    continue;
                }
                annotation.labels.push(label.to_string());
            }
            if !row.comment.is_empty() {
                annotation.comment = Some(row.comment.clone());
            }

            self.annotations.insert(index, annotation);
            restored += 1;
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::default_labels;
    use crate::state::{Case, Dataset};

    fn store(limit: SelectionLimit) -> AnnotationStore {
        AnnotationStore::new("alice", default_labels().unwrap(), limit)
    }

    fn dataset(n: usize) -> Dataset {
        Dataset::new(
            (0..n)
                .map(|i| Case {
                    id: format!("c{i}"),
                    hate_speech: format!("hate {i}"),
                    counter_speech: format!("counter {i}"),
                    hs_id: None,
                    id_orig: None,
                })
                .collect(),
        )
    }

    #[test]
    fn untouched_case_reads_empty() {
        let s = store(SelectionLimit::Unlimited);
        assert_eq!(s.annotation(42), &Annotation::EMPTY);
        assert!(!s.is_case_complete(42));
    }

    #[test]
    fn invalid_label_leaves_state_unchanged() {
        let mut s = store(SelectionLimit::Unlimited);
        s.toggle_label(0, "Denouncing").unwrap();
        let before = s.annotation(0).clone();

        for bogus in ["Insulting", "", "denouncing", "Denouncing,Fact-Checking"] {
            let err = s.toggle_label(0, bogus).unwrap_err();
            assert!(matches!(err, AnnotatorError::InvalidLabel { .. }));
            assert_eq!(s.annotation(0), &before);
        }
        assert!(s.select_label(1, "Insulting").is_err());
        assert_eq!(s.annotation(1), &Annotation::EMPTY);
    }

    #[test]
    fn toggle_twice_is_an_involution() {
        let mut s = store(SelectionLimit::Unlimited);
        s.toggle_label(3, "Fact-Checking").unwrap();
        let before = s.annotation(3).clone();

        assert_eq!(s.toggle_label(3, "Denouncing").unwrap(), ToggleOutcome::Added);
        assert_eq!(s.toggle_label(3, "Denouncing").unwrap(), ToggleOutcome::Removed);
        assert_eq!(s.annotation(3), &before);
    }

    #[test]
    fn selection_keeps_insertion_order() {
        let mut s = store(SelectionLimit::Unlimited);
        for label in ["Denouncing", "Empathy and Affiliation", "Counter Questions"] {
            s.toggle_label(0, label).unwrap();
        }
        assert_eq!(
            s.annotation(0).labels,
            vec!["Denouncing", "Empathy and Affiliation", "Counter Questions"]
        );
    }

    #[test]
    fn third_label_is_rejected_with_cap_of_two() {
        let mut s = store(SelectionLimit::AtMost(2));
        s.toggle_label(0, "Denouncing").unwrap();
        s.toggle_label(0, "Fact-Checking").unwrap();

        let outcome = s.toggle_label(0, "Humour/Sarcasm").unwrap();
        assert_eq!(
            outcome,
            ToggleOutcome::Rejected(Warning::SelectionLimitExceeded { limit: 2 })
        );
        assert_eq!(s.annotation(0).labels, vec!["Denouncing", "Fact-Checking"]);

        // Removing still works at the cap.
        assert_eq!(s.toggle_label(0, "Denouncing").unwrap(), ToggleOutcome::Removed);
        assert_eq!(s.toggle_label(0, "Humour/Sarcasm").unwrap(), ToggleOutcome::Added);
    }

    #[test]
    fn select_label_replaces_selection() {
        let mut s = store(SelectionLimit::AtMost(1));
        s.select_label(0, "Denouncing").unwrap();
        s.select_label(0, "Fact-Checking").unwrap();
        assert_eq!(s.annotation(0).labels, vec!["Fact-Checking"]);
    }

    #[test]
    fn comment_does_not_complete_a_case() {
        let mut s = store(SelectionLimit::Unlimited);
        s.set_comment(5, "unsure");
        assert_eq!(s.annotation(5).comment.as_deref(), Some("unsure"));
        assert!(!s.is_case_complete(5));
        s.set_comment(5, "");
        assert_eq!(s.annotation(5).comment, None);
    }

    #[test]
    fn progress_over_empty_range_is_zero() {
        let s = store(SelectionLimit::Unlimited);
        let p = s.compute_progress(7..7);
        assert_eq!((p.completed, p.total), (0, 0));
        assert_eq!(p.ratio(), 0.0);
    }

    #[test]
    fn progress_counts_complete_cases() {
        let mut s = store(SelectionLimit::Unlimited);
        s.toggle_label(0, "Denouncing").unwrap();
        s.toggle_label(2, "Denouncing").unwrap();
        s.set_comment(3, "comment only");
        let p = s.compute_progress(0..4);
        assert_eq!((p.completed, p.total), (2, 4));
        assert_eq!(p.ratio(), 0.5);
    }

    #[test]
    fn page_with_one_gap_cannot_advance() {
        let mut s = store(SelectionLimit::Unlimited);
        for i in [10, 11, 13, 14] {
            s.toggle_label(i, "Denouncing").unwrap();
        }
        assert!(!s.can_advance_page(10..15));
        assert_eq!(s.incomplete_cases(10..15), vec![12]);

        s.toggle_label(12, "Fact-Checking").unwrap();
        assert!(s.can_advance_page(10..15));
    }

    #[test]
    fn export_skips_incomplete_cases_and_is_repeatable() {
        let ds = dataset(4);
        let mut s = store(SelectionLimit::Unlimited);
        s.toggle_label(2, "Fact-Checking").unwrap();
        s.toggle_label(2, "Denouncing").unwrap();
        s.set_comment(2, "strong");
        s.toggle_label(0, "Counter Questions").unwrap();
        s.set_comment(1, "comment without label");
        s.toggle_label(3, "Denouncing").unwrap();
        s.toggle_label(3, "Denouncing").unwrap();

        let rows = s.export_all(&ds).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "c0");
        assert_eq!(rows[0].comment, "");
        assert_eq!(rows[1].id, "c2");
        assert_eq!(rows[1].labels, "Fact-Checking,Denouncing");
        assert_eq!(rows[1].comment, "strong");
        assert_eq!(rows[1].username, "alice");
        assert_eq!(rows[1].counter_speech, "counter 2");

        assert_eq!(s.export_all(&ds).unwrap(), rows);
    }

    #[test]
    fn export_reports_cases_outside_provider() {
        let ds = dataset(2);
        let mut s = store(SelectionLimit::Unlimited);
        s.toggle_label(9, "Denouncing").unwrap();
        assert!(matches!(
            s.export_all(&ds).unwrap_err(),
            AnnotatorError::CaseNotFound(9)
        ));
    }

    #[test]
    fn restore_rebuilds_from_own_rows() {
        let ds = dataset(3);
        let mut original = store(SelectionLimit::AtMost(2));
        original.toggle_label(1, "Denouncing").unwrap();
        original.toggle_label(1, "Fact-Checking").unwrap();
        original.set_comment(1, "ok");
        let mut rows = original.export_all(&ds).unwrap();
        let base = rows[0].clone();
        rows.push(ExportRow {
            username: "bob".into(),
            ..base.clone()
        });
        rows.push(ExportRow {
            id: "c2".into(),
            labels: "Retired Label,Denouncing".into(),
            ..base
        });

        let mut resumed = store(SelectionLimit::AtMost(2));
        assert_eq!(resumed.restore(&rows, &ds), 2);
        assert_eq!(resumed.annotation(1), original.annotation(1));
        assert_eq!(resumed.annotation(2).labels, vec!["Denouncing"]);
    }
}
