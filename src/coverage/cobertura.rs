//! Cobertura XML format parser

use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs;
use std::path::Path;

use super::{Counter, FileCoverage};

/// Parse a Cobertura XML file
pub fn parse_cobertura(path: &Path) -> Result<Vec<FileCoverage>> {
    let content = fs::read_to_string(path)?;
    parse_cobertura_string(&content)
}

#[derive(Default)]
struct ClassTally {
    filename: String,
    lines_covered: u32,
    lines_total: u32,
    branches_covered: u32,
    branches_total: u32,
    functions_covered: u32,
    functions_total: u32,
}

impl ClassTally {
    fn finish(self) -> FileCoverage {
        FileCoverage::new(
            &self.filename,
            Counter::new(self.lines_covered, self.lines_total),
            Counter::new(self.branches_covered, self.branches_total),
            Counter::new(self.functions_covered, self.functions_total),
        )
    }

    fn record_line(&mut self, e: &BytesStart) {
        self.lines_total = self.lines_total.saturating_add(1);

        for attr in e.attributes().filter_map(|a| a.ok()) {
            let value = String::from_utf8_lossy(&attr.value);
            match attr.key.as_ref() {
                b"hits" => {
                    if value.parse::<u64>().map(|hits| hits > 0).unwrap_or(false) {
                        self.lines_covered = self.lines_covered.saturating_add(1);
                    }
                }
                b"condition-coverage" => {
                    // "50% (1/2)"
                    if let Some((covered, total)) = parse_condition_coverage(&value) {
                        self.branches_covered = self.branches_covered.saturating_add(covered);
                        self.branches_total = self.branches_total.saturating_add(total);
                    }
                }
                _ => {}
            }
        }
    }

    fn record_method(&mut self, e: &BytesStart) {
        self.functions_total = self.functions_total.saturating_add(1);

        let covered = e
            .attributes()
            .filter_map(|a| a.ok())
            .find(|attr| attr.key.as_ref() == b"line-rate")
            .and_then(|attr| String::from_utf8_lossy(&attr.value).parse::<f64>().ok())
            .map(|rate| rate > 0.0)
            .unwrap_or(false);

        if covered {
            self.functions_covered = self.functions_covered.saturating_add(1);
        }
    }
}

fn parse_condition_coverage(value: &str) -> Option<(u32, u32)> {
    let start = value.find('(')?;
    let end = value.find(')')?;
    let (covered, total) = value.get(start + 1..end)?.split_once('/')?;
    Some((covered.trim().parse().ok()?, total.trim().parse().ok()?))
}

fn attribute(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|attr| attr.key.as_ref() == name)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

#[derive(Default)]
struct CoberturaParser {
    files: Vec<FileCoverage>,
    current: Option<ClassTally>,
    // Lines nested under <method> repeat the class-level <lines>
    method_depth: usize,
}

impl CoberturaParser {
    fn open(&mut self, e: &BytesStart, is_empty: bool) {
        match e.name().as_ref() {
            b"class" => {
                let filename = attribute(e, b"filename").unwrap_or_default();
                if filename.is_empty() {
                    return;
                }
                let tally = ClassTally {
                    filename,
                    ..Default::default()
                };
                if is_empty {
                    self.files.push(tally.finish());
                } else {
                    self.current = Some(tally);
                }
            }
            b"method" => {
                if let Some(tally) = self.current.as_mut() {
                    tally.record_method(e);
                }
                if !is_empty {
                    self.method_depth += 1;
                }
            }
            b"line" if self.method_depth == 0 => {
                if let Some(tally) = self.current.as_mut() {
                    tally.record_line(e);
                }
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"method" => self.method_depth = self.method_depth.saturating_sub(1),
            b"class" => {
                if let Some(tally) = self.current.take() {
                    self.files.push(tally.finish());
                }
            }
            _ => {}
        }
    }
}

/// Parse Cobertura XML content from a string
pub fn parse_cobertura_string(content: &str) -> Result<Vec<FileCoverage>> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut parser = CoberturaParser::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => parser.open(e, false),
            Ok(Event::Empty(ref e)) => parser.open(e, true),
            Ok(Event::End(ref e)) => parser.close(e.name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("Error parsing Cobertura XML: {}", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(parser.files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cobertura() {
        let xml = r#"<?xml version="1.0"?>
<coverage line-rate="0.8" branch-rate="0.5" lines-covered="80" lines-valid="100">
    <packages>
        <package name="src">
            <classes>
                <class name="main" filename="src/main.py" line-rate="0.75" branch-rate="0.5">
                    <methods>
                        <method name="run" signature="" line-rate="1.0">
                            <lines>
                                <line number="1" hits="1"/>
                            </lines>
                        </method>
                        <method name="stop" signature="" line-rate="0.0">
                            <lines>
                                <line number="3" hits="0"/>
                            </lines>
                        </method>
                    </methods>
                    <lines>
                        <line number="1" hits="1"/>
                        <line number="2" hits="1" branch="true" condition-coverage="50% (1/2)"/>
                        <line number="3" hits="0"/>
                        <line number="4" hits="1"/>
                    </lines>
                </class>
            </classes>
        </package>
    </packages>
</coverage>"#;

        let files = parse_cobertura_string(xml).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file, "main.py");
        assert_eq!(files[0].lines, Counter::new(3, 4));
        assert_eq!(files[0].branches, Counter::new(1, 2));
        assert_eq!(files[0].functions, Counter::new(1, 2));
    }

    #[test]
    fn test_condition_coverage() {
        assert_eq!(parse_condition_coverage("50% (1/2)"), Some((1, 2)));
        assert_eq!(parse_condition_coverage("100% (4/4)"), Some((4, 4)));
        assert_eq!(parse_condition_coverage("garbage"), None);
    }

    #[test]
    fn test_huge_condition_counts_saturate() {
        let xml = r#"<coverage><classes><class filename="a.py"><lines>
            <line number="1" hits="1" condition-coverage="100% (4294967295/4294967295)"/>
            <line number="2" hits="1" condition-coverage="100% (4/4)"/>
        </lines></class></classes></coverage>"#;

        let files = parse_cobertura_string(xml).unwrap();
        assert_eq!(files[0].branches.total, u32::MAX);
        assert_eq!(files[0].lines, Counter::new(2, 2));
    }

    #[test]
    fn test_malformed_xml() {
        assert!(parse_cobertura_string("<coverage><class filename=\"a\"></coverage>").is_err());
    }
}
