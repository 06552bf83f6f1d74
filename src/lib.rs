//! Counter-speech strategy annotator.
//!
//! Annotators are assigned a slice of a dataset of hate speech / counter
//! speech pairs, tag each pair with strategies from a fixed taxonomy, page
//! through their slice and persist the result to a file or shared table.
//!
//! - `state` - cases, annotations and the per-session `AnnotationStore`
//! - `assignment` - which slice each annotator labels
//! - `export` - sinks that persist exported rows
//! - `session` - the session context driven by the terminal front end

pub mod assignment;
pub mod config;
pub mod csv;
pub mod error;
pub mod export;
pub mod labels;
pub mod session;
pub mod state;
pub mod utils;

pub use error::{AnnotatorError, Result, Warning};
