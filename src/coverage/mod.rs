//! Coverage module
//!
//! Provides:
//! - LCOV parsing
//! - Cobertura XML parsing
//! - Merging report locations into the current run

mod cobertura;
mod lcov;

pub use cobertura::*;
pub use lcov::*;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Covered/total pair with its percentage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Counter {
    pub covered: u32,
    pub total: u32,
    pub percent: f64,
}

impl Counter {
    pub fn new(covered: u32, total: u32) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            (covered as f64 / total as f64) * 100.0
        };

        Self { covered, total, percent }
    }

    pub fn merge(self, other: Counter) -> Counter {
        Counter::new(
            self.covered.saturating_add(other.covered),
            self.total.saturating_add(other.total),
        )
    }
}

/// Coverage data for a single file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileCoverage {
    /// File name without directories, the key used for comparisons
    pub file: String,
    /// Path as written in the report
    pub path: String,
    pub lines: Counter,
    pub branches: Counter,
    pub functions: Counter,
}

impl FileCoverage {
    pub fn new(path: &str, lines: Counter, branches: Counter, functions: Counter) -> Self {
        let file = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());

        Self {
            file,
            path: path.to_string(),
            lines,
            branches,
            functions,
        }
    }
}

/// Project-wide totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TotalCoverage {
    pub lines: Counter,
    pub branches: Counter,
    pub functions: Counter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub coverage: TotalCoverage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentFiles {
    pub coverage: Vec<FileCoverage>,
}

/// Coverage computed for the working tree
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentRun {
    pub totals: Totals,
    pub files: CurrentFiles,
}

impl CurrentRun {
    /// Build a run from parsed report files. Entries for the same path merge.
    pub fn from_files(files: Vec<FileCoverage>) -> Self {
        let mut merged: Vec<FileCoverage> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for file in files {
            match positions.get(&file.path) {
                Some(&idx) => {
                    let existing = &mut merged[idx];
                    existing.lines = existing.lines.merge(file.lines);
                    existing.branches = existing.branches.merge(file.branches);
                    existing.functions = existing.functions.merge(file.functions);
                }
                None => {
                    positions.insert(file.path.clone(), merged.len());
                    merged.push(file);
                }
            }
        }

        let mut totals = TotalCoverage::default();
        for file in &merged {
            totals.lines = totals.lines.merge(file.lines);
            totals.branches = totals.branches.merge(file.branches);
            totals.functions = totals.functions.merge(file.functions);
        }

        Self {
            totals: Totals { coverage: totals },
            files: CurrentFiles { coverage: merged },
        }
    }

    pub fn line_percent(&self) -> f64 {
        self.totals.coverage.lines.percent
    }

    pub fn print_summary(&self) {
        let totals = &self.totals.coverage;
        println!("{}", "Coverage:".bold());
        println!("  Lines:     {:.2}% ({}/{})", totals.lines.percent, totals.lines.covered, totals.lines.total);
        println!("  Branches:  {:.2}% ({}/{})", totals.branches.percent, totals.branches.covered, totals.branches.total);
        println!("  Functions: {:.2}% ({}/{})", totals.functions.percent, totals.functions.covered, totals.functions.total);

        if self.files.coverage.is_empty() {
            println!("  {}", "No files in coverage reports".dimmed());
            return;
        }

        println!();
        for file in &self.files.coverage {
            let lines = format!("{:6.2}%", file.lines.percent);
            let lines = if file.lines.percent >= 80.0 {
                lines.green()
            } else if file.lines.percent >= 50.0 {
                lines.yellow()
            } else {
                lines.red()
            };
            println!("  {} {}", lines, file.path);
        }
    }
}

/// Parse a single report, picking the format from the file extension
pub fn parse_report(path: &Path) -> Result<Vec<FileCoverage>> {
    let is_xml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("xml"))
        .unwrap_or(false);

    let files = if is_xml {
        parse_cobertura(path)
    } else {
        parse_lcov(path)
    };

    files.with_context(|| format!("Failed to parse coverage report: {}", path.display()))
}

/// Expand the configured locations relative to `base_dir` and parse every report found
pub fn parse_locations(base_dir: &Path, locations: &[String]) -> Result<CurrentRun> {
    if locations.is_empty() {
        anyhow::bail!("No coverage locations configured");
    }

    let mut files = Vec::new();
    for location in locations {
        for path in resolve_location(base_dir, location)? {
            files.extend(parse_report(&path)?);
        }
    }

    Ok(CurrentRun::from_files(files))
}

fn resolve_location(base_dir: &Path, location: &str) -> Result<Vec<PathBuf>> {
    let full = base_dir.join(location);

    if !location.contains(['*', '?', '[']) {
        return Ok(vec![full]);
    }

    let pattern = full.to_string_lossy().to_string();
    let mut paths = Vec::new();
    for entry in glob::glob(&pattern).with_context(|| format!("Invalid coverage location: {}", location))? {
        paths.push(entry?);
    }

    if paths.is_empty() {
        anyhow::bail!("No coverage report matched {}", location);
    }

    paths.sort();
    Ok(paths)
}
