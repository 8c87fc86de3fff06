//! LCOV format parser

use anyhow::Result;
use std::fs;
use std::path::Path;

use super::{Counter, FileCoverage};

/// Parse an LCOV file
pub fn parse_lcov(path: &Path) -> Result<Vec<FileCoverage>> {
    let content = fs::read_to_string(path)?;
    parse_lcov_string(&content)
}

#[derive(Default)]
struct Record {
    path: String,
    lines_found: u32,
    lines_hit: u32,
    branches_found: u32,
    branches_hit: u32,
    functions_found: u32,
    functions_hit: u32,
}

impl Record {
    fn finish(self) -> FileCoverage {
        FileCoverage::new(
            &self.path,
            Counter::new(self.lines_hit, self.lines_found),
            Counter::new(self.branches_hit, self.branches_found),
            Counter::new(self.functions_hit, self.functions_found),
        )
    }
}

fn count(value: &str) -> u32 {
    value.trim().parse().unwrap_or(0)
}

/// Parse LCOV content from a string
pub fn parse_lcov_string(content: &str) -> Result<Vec<FileCoverage>> {
    let mut files = Vec::new();
    let mut current: Option<Record> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(path) = line.strip_prefix("SF:") {
            current = Some(Record {
                path: path.to_string(),
                ..Default::default()
            });
            continue;
        }

        if line == "end_of_record" {
            if let Some(record) = current.take() {
                files.push(record.finish());
            }
            continue;
        }

        let Some(record) = current.as_mut() else {
            continue;
        };

        if let Some(value) = line.strip_prefix("LF:") {
            record.lines_found = count(value);
        } else if let Some(value) = line.strip_prefix("LH:") {
            record.lines_hit = count(value);
        } else if let Some(value) = line.strip_prefix("BRF:") {
            record.branches_found = count(value);
        } else if let Some(value) = line.strip_prefix("BRH:") {
            record.branches_hit = count(value);
        } else if let Some(value) = line.strip_prefix("FNF:") {
            record.functions_found = count(value);
        } else if let Some(value) = line.strip_prefix("FNH:") {
            record.functions_hit = count(value);
        }
    }

    // Reports cut off before the final end_of_record still count
    if let Some(record) = current.take() {
        files.push(record.finish());
    }

    Ok(files)
}
