//! Galaxy - branch coverage reporter
//!
//! Compares the coverage of a feature branch with the last recorded run of
//! the project and comments the result on the pull/merge request:
//! - LCOV and Cobertura report parsing
//! - Git diff summaries between the default branch and the feature branch
//! - Per-file and overall percentage-change labels
//! - GitHub pull request comments, GitLab merge request notes, Slack summaries

pub mod analyze;
pub mod compare;
pub mod config;
pub mod console;
pub mod coverage;
pub mod git;
pub mod notifications;
pub mod snapshot;

pub use analyze::{analyze, run_analysis, AnalyzeRequest, Outcome};
pub use compare::{label, ComparisonResult, FileComparison};
pub use config::{GalaxySettings, Manifest, Precondition};
pub use coverage::CurrentRun;
pub use git::{DiffSummary, GitDiff};
pub use snapshot::{HttpSnapshotStore, LastRun, SnapshotStore};
