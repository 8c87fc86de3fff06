//! Stored coverage snapshots
//!
//! The last recorded run of a project lives in a remote JSON store at
//! `https://{host}/projects/{name}.json`.

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};

use crate::coverage::CurrentRun;

/// A numeric field that older snapshots may hold as a string
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Number(pub f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Number {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = match Option::<RawNumber>::deserialize(deserializer)? {
            Some(RawNumber::Number(n)) => n,
            Some(RawNumber::Text(text)) => text.trim().parse().unwrap_or(0.0),
            None => 0.0,
        };
        Ok(Number(value))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredTotals {
    #[serde(default)]
    pub current: Number,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub file: String,
    #[serde(default)]
    pub lines: Number,
    #[serde(default)]
    pub branches: Number,
    #[serde(default)]
    pub functions: Number,
}

/// The last recorded run. Both sections are absent for a project that was never recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<StoredTotals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<StoredFile>>,
}

impl LastRun {
    /// Overall line coverage of the stored run, zero when none was recorded
    pub fn current_percent(&self) -> f64 {
        self.coverage.as_ref().map(|c| c.current.0).unwrap_or(0.0)
    }
}

impl From<&CurrentRun> for LastRun {
    fn from(run: &CurrentRun) -> Self {
        let files = run
            .files
            .coverage
            .iter()
            .map(|f| StoredFile {
                file: f.file.clone(),
                lines: Number(f.lines.percent),
                branches: Number(f.branches.percent),
                functions: Number(f.functions.percent),
            })
            .collect();

        Self {
            coverage: Some(StoredTotals {
                current: Number(run.line_percent()),
            }),
            files: Some(files),
        }
    }
}

/// Source of the last recorded run
#[allow(async_fn_in_trait)]
pub trait SnapshotStore {
    async fn fetch(&self, project: &str) -> Result<LastRun>;
}

/// Snapshot store reached over HTTPS
pub struct HttpSnapshotStore {
    host: String,
    client: reqwest::Client,
}

impl HttpSnapshotStore {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn url_for(&self, project: &str) -> String {
        snapshot_url(&self.host, project)
    }
}

impl SnapshotStore for HttpSnapshotStore {
    async fn fetch(&self, project: &str) -> Result<LastRun> {
        let url = self.url_for(project);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        let body = response.text().await?;
        read_snapshot_response(status, &url, &body)
    }
}

/// Turn a store reply into a snapshot, failing on non-2xx statuses
pub fn read_snapshot_response(status: StatusCode, url: &str, body: &str) -> Result<LastRun> {
    if !status.is_success() {
        anyhow::bail!("Snapshot store returned {} for {} - {}", status, url, body);
    }

    parse_snapshot(body).with_context(|| format!("Invalid snapshot at {}", url))
}

pub fn snapshot_url(host: &str, project: &str) -> String {
    format!("https://{}/projects/{}.json", host.trim_end_matches('/'), project)
}

/// Parse a snapshot body; `null` means the project has no recorded run yet
pub fn parse_snapshot(body: &str) -> Result<LastRun> {
    let snapshot: Option<LastRun> = serde_json::from_str(body)?;
    Ok(snapshot.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::{Counter, FileCoverage};

    #[test]
    fn test_snapshot_url() {
        assert_eq!(
            snapshot_url("galaxy-demo.firebaseio.com/", "web-app"),
            "https://galaxy-demo.firebaseio.com/projects/web-app.json"
        );
    }

    #[test]
    fn test_parse_snapshot() {
        let body = r#"{
            "coverage": { "current": 81.5 },
            "files": [
                { "file": "a.js", "lines": 80, "branches": "50", "functions": 100 },
                { "file": "b.js", "lines": "n/a" }
            ]
        }"#;

        let snapshot = parse_snapshot(body).unwrap();
        let files = snapshot.files.as_ref().unwrap();

        assert_eq!(snapshot.current_percent(), 81.5);
        assert_eq!(files[0].lines, Number(80.0));
        assert_eq!(files[0].branches, Number(50.0));
        assert_eq!(files[1].lines, Number(0.0));
        assert_eq!(files[1].functions, Number(0.0));
    }

    #[test]
    fn test_parse_unrecorded_project() {
        let snapshot = parse_snapshot("null").unwrap();
        assert!(snapshot.files.is_none());
        assert_eq!(snapshot.current_percent(), 0.0);

        let snapshot = parse_snapshot("{}").unwrap();
        assert_eq!(snapshot, LastRun::default());
    }

    #[test]
    fn test_error_status_is_a_failure() {
        let url = "https://galaxy.example.com/projects/web.json";

        let err = read_snapshot_response(StatusCode::UNAUTHORIZED, url, r#"{"error":"Permission denied"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains(url));

        // A JSON error body must not be mistaken for an empty snapshot
        assert!(read_snapshot_response(StatusCode::NOT_FOUND, url, "null").is_err());

        let snapshot = read_snapshot_response(StatusCode::OK, url, r#"{"coverage":{"current":12}}"#).unwrap();
        assert_eq!(snapshot.current_percent(), 12.0);
    }

    #[test]
    fn test_parse_invalid_body() {
        assert!(parse_snapshot("<html>Service Unavailable</html>").is_err());
    }

    #[test]
    fn test_from_current_run() {
        let run = CurrentRun::from_files(vec![FileCoverage::new(
            "src/a.js",
            Counter::new(1, 4),
            Counter::default(),
            Counter::new(1, 1),
        )]);

        let snapshot = LastRun::from(&run);
        let json = serde_json::to_value(&snapshot).unwrap();

        assert_eq!(json["coverage"]["current"], 25.0);
        assert_eq!(json["files"][0]["file"], "a.js");
        assert_eq!(json["files"][0]["functions"], 100.0);
    }
}
