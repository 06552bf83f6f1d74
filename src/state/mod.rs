//! State management types for the annotator.
//!
//! This module contains:
//! - Case and annotation records
//! - The dataset provider (CSV / JSON loading)
//! - The per-session annotation store

mod dataset;
mod store;
mod types;

pub use dataset::*;
pub use store::*;
pub use types::*;
