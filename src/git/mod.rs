//! Git operations module
//!
//! Provides:
//! - Diff summaries between two branches
//! - Current branch detection

pub mod diff;

#[cfg(test)]
pub(crate) mod test_repo;

pub use diff::{DiffFile, DiffSummary, GitDiff};
