//! Branch coverage comparison
//!
//! Joins the files changed on a branch with the last recorded run and the
//! current run, labelling the change for each file and for the project.

mod label;

pub use label::label;

use colored::Colorize;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::coverage::CurrentRun;
use crate::snapshot::LastRun;

/// Per-file percentages shared by both snapshot shapes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FileMetrics {
    pub lines: f64,
    pub branches: f64,
    pub functions: f64,
}

/// File name to metrics. Later entries for the same name replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct CoverageIndex {
    entries: HashMap<String, FileMetrics>,
}

impl CoverageIndex {
    pub fn insert(&mut self, file: &str, metrics: FileMetrics) {
        self.entries.insert(file_key(file), metrics);
    }

    pub fn get(&self, file: &str) -> Option<&FileMetrics> {
        self.entries.get(file)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, FileMetrics)> for CoverageIndex {
    fn from_iter<I: IntoIterator<Item = (S, FileMetrics)>>(iter: I) -> Self {
        let mut index = CoverageIndex::default();
        for (file, metrics) in iter {
            index.insert(file.as_ref(), metrics);
        }
        index
    }
}

impl From<&LastRun> for CoverageIndex {
    fn from(run: &LastRun) -> Self {
        run.files
            .iter()
            .flatten()
            .map(|f| {
                let metrics = FileMetrics {
                    lines: f.lines.0,
                    branches: f.branches.0,
                    functions: f.functions.0,
                };
                (f.file.as_str(), metrics)
            })
            .collect()
    }
}

impl From<&CurrentRun> for CoverageIndex {
    fn from(run: &CurrentRun) -> Self {
        run.files
            .coverage
            .iter()
            .map(|f| {
                let metrics = FileMetrics {
                    lines: f.lines.percent,
                    branches: f.branches.percent,
                    functions: f.functions.percent,
                };
                (f.file.as_str(), metrics)
            })
            .collect()
    }
}

// Changed files are matched by name only
fn file_key(file: &str) -> String {
    Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileComparison {
    pub name: String,
    pub diff: String,
}

/// Overall label plus one label per changed file with coverage data
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonResult {
    pub coverage: String,
    pub files: Vec<FileComparison>,
}

impl ComparisonResult {
    pub fn print_summary(&self) {
        println!("Coverage comparison:");
        println!("  {} Overall: {}", indicator(&self.coverage), colorize(&self.coverage));

        if self.files.is_empty() {
            println!("  {}", "No changed files with coverage data".dimmed());
            return;
        }

        for file in &self.files {
            println!("  {} {}: {}", indicator(&file.diff), file.name, colorize(&file.diff));
        }
    }
}

fn indicator(diff: &str) -> colored::ColoredString {
    if diff.starts_with('+') {
        "↑".green()
    } else if diff.starts_with('-') {
        "↓".red()
    } else {
        "→".dimmed()
    }
}

fn colorize(diff: &str) -> colored::ColoredString {
    if diff.starts_with('+') {
        diff.green()
    } else if diff.starts_with('-') {
        diff.red()
    } else {
        diff.dimmed()
    }
}

/// Label each changed file found in either index, keeping the changed-files order
pub fn compare_files(
    changed: &[String],
    last: &CoverageIndex,
    current: &CoverageIndex,
) -> Vec<FileComparison> {
    changed
        .iter()
        .filter_map(|name| {
            let previous = last.get(name);
            let now = current.get(name);
            if previous.is_none() && now.is_none() {
                return None;
            }

            let previous = previous.map(|m| m.lines).unwrap_or(0.0);
            let now = now.map(|m| m.lines).unwrap_or(0.0);

            Some(FileComparison {
                name: name.clone(),
                diff: label(now, previous),
            })
        })
        .collect()
}

pub fn compare(changed: &[String], last_run: &LastRun, current_run: &CurrentRun) -> ComparisonResult {
    let last = CoverageIndex::from(last_run);
    let current = CoverageIndex::from(current_run);

    ComparisonResult {
        coverage: label(current_run.line_percent(), last_run.current_percent()),
        files: compare_files(changed, &last, &current),
    }
}
