//! Annotation session: one annotator, one run.
//!
//! Holds everything the terminal driver needs between user actions (the
//! assignment, the current page and the annotation store) and turns each
//! parsed `Command` into a text reply.

use std::ops::Range;
use std::str::FromStr;

use crate::assignment::{resolve_assignment, Assignment, CompletedRegistry};
use crate::config::AppConfig;
use crate::error::{AnnotatorError, Result, Warning};
use crate::export::Sink;
use crate::labels::LabelSet;
use crate::state::{
    AnnotationStore, CaseIndex, CaseProvider, Dataset, Progress, SelectionLimit, ToggleOutcome,
};

/// One user action, parsed from a line of input. Pair numbers are 1-based
/// positions in the full dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Next,
    Prev,
    Toggle { pair: usize, label: String },
    Select { pair: usize, label: String },
    Clear { pair: usize },
    Comment { pair: usize, text: String },
    Progress,
    Guidelines,
    Save,
    Submit,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  show | s                     redisplay the current page
  next | n, prev | p           change page
  toggle | t <pair> <label>    add or remove a strategy (number or name)
  select <pair> <label>        make <label> the only strategy
  clear <pair>                 remove all strategies from a pair
  comment | c <pair> [text]    set or clear a comment
  progress                     show completion
  guidelines | g               show the annotation guidelines
  save                         save annotations
  submit                       save and finish
  help | h, quit | q";

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let pair_and_text = |rest: &str| -> std::result::Result<(usize, String), String> {
            let (pair, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let pair = pair
                .parse::<usize>()
                .ok()
                .filter(|&p| p > 0)
                .ok_or_else(|| format!("'{pair}' is not a pair number"))?;
            Ok((pair, text.trim().to_string()))
        };
        let pair_and_label = |rest: &str| -> std::result::Result<(usize, String), String> {
            let (pair, label) = pair_and_text(rest)?;
            if label.is_empty() {
                return Err(format!("usage: {word} <pair> <label>"));
            }
            Ok((pair, label))
        };

        match word.to_ascii_lowercase().as_str() {
            "show" | "s" | "" => Ok(Command::Show),
            "next" | "n" => Ok(Command::Next),
            "prev" | "p" => Ok(Command::Prev),
            "toggle" | "t" => {
                let (pair, label) = pair_and_label(rest)?;
                Ok(Command::Toggle { pair, label })
            }
            "select" => {
                let (pair, label) = pair_and_label(rest)?;
                Ok(Command::Select { pair, label })
            }
            "clear" => Ok(Command::Clear {
                pair: pair_and_text(rest)?.0,
            }),
            "comment" | "c" => {
                let (pair, text) = pair_and_text(rest)?;
                Ok(Command::Comment { pair, text })
            }
            "progress" => Ok(Command::Progress),
            "guidelines" | "g" => Ok(Command::Guidelines),
            "save" => Ok(Command::Save),
            "submit" => Ok(Command::Submit),
            "help" | "h" | "?" => Ok(Command::Help),
            "quit" | "q" | "exit" => Ok(Command::Quit),
            other => Err(format!("unknown command '{other}' (type 'help')")),
        }
    }
}

/// Text to show after a command, and whether the session is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub quit: bool,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

/// Outcome of a page move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageMove {
    Moved,
    AtBoundary,
    Blocked(Warning),
}

pub struct Session {
    assignment: Assignment,
    dataset: Dataset,
    store: AnnotationStore,
    sink: Box<dyn Sink>,
    completed: Option<CompletedRegistry>,
    per_page: usize,
    page: usize,
    submitted: bool,
}

impl Session {
    /// Start a session for `username`.
    ///
    /// Refuses annotators already recorded as completed. An appending sink
    /// needs a completed registry, since nothing else stops the same rows
    /// being appended twice. Annotations saved earlier to a replaceable sink
    /// are loaded back.
    pub fn start(
        config: &AppConfig,
        dataset: Dataset,
        labels: LabelSet,
        username: &str,
        sink: Box<dyn Sink>,
        completed: Option<CompletedRegistry>,
    ) -> Result<Self> {
        let username = username.trim();
        if sink.appends() && completed.is_none() {
            return Err(AnnotatorError::Config(format!(
                "{} needs a completed-annotator registry",
                sink.describe()
            )));
        }
        if let Some(registry) = &completed {
            if registry.is_completed(username)? {
                return Err(AnnotatorError::AlreadyCompleted(username.to_string()));
            }
        }

        let assignment = resolve_assignment(&config.assignment, username, dataset.len())?;
        let limit = SelectionLimit::from_config(config.annotation.max_selections);
        let mut store = AnnotationStore::new(assignment.username.clone(), labels, limit);

        if !sink.appends() {
            let rows = sink.load_rows()?;
            let restored = store.restore(&rows, &dataset);
            if restored > 0 {
                tracing::info!(username, restored, "Resumed earlier annotations");
            }
        }

        tracing::info!(
            username,
            start = assignment.range.start,
            end = assignment.range.end,
            bucket = ?assignment.bucket,
            "Session started"
        );

        Ok(Self {
            assignment,
            dataset,
            store,
            sink,
            completed,
            per_page: config.annotation.items_per_page.max(1),
            page: 0,
            submitted: false,
        })
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_count(&self) -> usize {
        self.assignment.range.len().div_ceil(self.per_page)
    }

    /// Case indices on the current page.
    pub fn page_range(&self) -> Range<CaseIndex> {
        let range = &self.assignment.range;
        let start = (range.start + self.page * self.per_page).min(range.end);
        start..(start + self.per_page).min(range.end)
    }

    pub fn progress(&self) -> Progress {
        self.store.compute_progress(self.assignment.range.clone())
    }

    /// Advance a page, unless a pair on the current page is unlabelled.
    pub fn next_page(&mut self) -> PageMove {
        if self.page + 1 >= self.page_count() {
            return PageMove::AtBoundary;
        }
        let missing = self.store.incomplete_cases(self.page_range());
        if !missing.is_empty() {
            return PageMove::Blocked(Warning::IncompletePage { missing });
        }
        self.page += 1;
        PageMove::Moved
    }

    pub fn prev_page(&mut self) -> PageMove {
        if self.page == 0 {
            return PageMove::AtBoundary;
        }
        self.page -= 1;
        PageMove::Moved
    }

    /// Map a 1-based pair number to a case index inside the assignment.
    fn case_index(&self, pair: usize) -> Result<CaseIndex> {
        let index = pair.saturating_sub(1);
        if pair == 0 || !self.assignment.range.contains(&index) {
            return Err(AnnotatorError::CaseNotFound(index));
        }
        Ok(index)
    }

    pub fn toggle(&mut self, pair: usize, label: &str) -> Result<ToggleOutcome> {
        let index = self.case_index(pair)?;
        let label = self.store.labels().resolve(label).to_string();
        self.store.toggle_label(index, &label)
    }

    pub fn select(&mut self, pair: usize, label: &str) -> Result<()> {
        let index = self.case_index(pair)?;
        let label = self.store.labels().resolve(label).to_string();
        self.store.select_label(index, &label)
    }

    pub fn clear(&mut self, pair: usize) -> Result<()> {
        let index = self.case_index(pair)?;
        self.store.clear_labels(index);
        Ok(())
    }

    pub fn comment(&mut self, pair: usize, text: &str) -> Result<()> {
        let index = self.case_index(pair)?;
        self.store.set_comment(index, text);
        Ok(())
    }

    /// Persist every labelled pair. Returns the number of rows written.
    ///
    /// Append-only sinks cannot take the same rows twice, so for them a
    /// save is a submit and needs every pair labelled.
    pub fn save(&mut self) -> Result<usize> {
        if self.sink.appends() {
            return self.submit();
        }
        self.persist()
    }

    /// Persist and record the annotator as finished. Every assigned pair
    /// must be labelled.
    pub fn submit(&mut self) -> Result<usize> {
        if self.submitted {
            return Err(AnnotatorError::AlreadyCompleted(
                self.assignment.username.clone(),
            ));
        }
        let progress = self.progress();
        if !progress.is_done() {
            return Err(AnnotatorError::IncompleteSubmission {
                completed: progress.completed,
                total: progress.total,
            });
        }
        let written = self.persist()?;
        self.submitted = true;
        if let Some(registry) = &self.completed {
            registry.mark_completed(&self.assignment.username)?;
        }
        Ok(written)
    }

    fn persist(&mut self) -> Result<usize> {
        let rows = self.store.export_all(&self.dataset)?;
        self.store.persist(&rows, self.sink.as_mut())?;
        Ok(rows.len())
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    /// Plain-text view of the current page.
    pub fn render_page(&self) -> String {
        let range = self.page_range();
        let mut out = format!("Logged in as: {}\n", self.assignment.username);
        if range.is_empty() {
            out.push_str("No pairs are assigned to this username.\n");
            return out;
        }
        out.push_str(&format!(
            "Page {} of {} (pairs {}-{}) | Progress: {}\n",
            self.page + 1,
            self.page_count(),
            range.start + 1,
            range.end,
            self.progress(),
        ));

        for index in range {
            let Some(case) = self.dataset.case(index) else {
                continue;
            };
            let annotation = self.store.annotation(index);
            out.push_str(&format!("\nPair {}\n", index + 1));
            out.push_str(&format!("  Hate speech:    {}\n", case.hate_speech));
            out.push_str(&format!("  Counter speech: {}\n", case.counter_speech));
            let strategies = if annotation.labels.is_empty() {
                "-".to_string()
            } else {
                annotation.labels.join(", ")
            };
            out.push_str(&format!("  Strategies:     {strategies}\n"));
            if let Some(comment) = &annotation.comment {
                out.push_str(&format!("  Comment:        {comment}\n"));
            }
        }

        out.push_str("\nStrategies:");
        for (i, name) in self.store.labels().names().enumerate() {
            out.push_str(&format!(" [{}] {name}", i + 1));
        }
        out.push('\n');
        out
    }

    /// Apply one command. Fatal errors propagate; rejected actions and
    /// warnings become reply text.
    pub fn execute(&mut self, command: Command) -> Result<Reply> {
        let reply = match command {
            Command::Show => Reply::text(self.render_page()),
            Command::Next => match self.next_page() {
                PageMove::Moved => Reply::text(self.render_page()),
                PageMove::AtBoundary => Reply::text("This is the last page. Use 'submit' when done."),
                PageMove::Blocked(warning) => Reply::text(warning.to_string()),
            },
            Command::Prev => match self.prev_page() {
                PageMove::Moved => Reply::text(self.render_page()),
                _ => Reply::text("This is the first page."),
            },
            Command::Toggle { pair, label } => match self.toggle(pair, &label) {
                Ok(ToggleOutcome::Added) => Reply::text(format!("Pair {pair}: added.")),
                Ok(ToggleOutcome::Removed) => Reply::text(format!("Pair {pair}: removed.")),
                Ok(ToggleOutcome::Rejected(warning)) => Reply::text(warning.to_string()),
                Err(e) => recoverable(e)?,
            },
            Command::Select { pair, label } => match self.select(pair, &label) {
                Ok(()) => Reply::text(format!("Pair {pair}: selected.")),
                Err(e) => recoverable(e)?,
            },
            Command::Clear { pair } => match self.clear(pair) {
                Ok(()) => Reply::text(format!("Pair {pair}: cleared.")),
                Err(e) => recoverable(e)?,
            },
            Command::Comment { pair, text } => match self.comment(pair, &text) {
                Ok(()) => Reply::text(format!("Pair {pair}: comment saved.")),
                Err(e) => recoverable(e)?,
            },
            Command::Progress => Reply::text(format!("Progress: {}", self.progress())),
            Command::Guidelines => Reply::text(self.store.labels().guidelines()),
            Command::Save => match self.save() {
                Ok(n) => Reply::text(format!("Saved {n} annotated pairs to {}.", self.sink.describe())),
                Err(e) => recoverable(e)?,
            },
            Command::Submit => match self.submit() {
                Ok(n) => Reply {
                    text: format!("Submitted {n} annotated pairs. Thank you!"),
                    quit: true,
                },
                Err(e) => recoverable(e)?,
            },
            Command::Help => Reply::text(HELP),
            Command::Quit => Reply {
                text: "Goodbye. Unsaved annotations are discarded.".to_string(),
                quit: true,
            },
        };
        Ok(reply)
    }
}

/// Errors the annotator can react to become a reply; the rest propagate.
fn recoverable(error: AnnotatorError) -> Result<Reply> {
    match error {
        AnnotatorError::InvalidLabel { .. }
        | AnnotatorError::CaseNotFound(_)
        | AnnotatorError::AlreadyCompleted(_)
        | AnnotatorError::IncompleteSubmission { .. }
        | AnnotatorError::Sink { .. } => {
            tracing::warn!(error = %error, "Action rejected");
            Ok(Reply::text(error.to_string()))
        }
        other => Err(other),
    }
}
