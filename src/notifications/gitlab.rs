//! GitLab merge request notes

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use super::{build_comment, has_marker, send_json};
use crate::compare::ComparisonResult;

#[derive(Debug, Deserialize)]
struct MergeRequest {
    iid: u64,
}

#[derive(Debug, Deserialize)]
pub struct Note {
    pub id: u64,
    #[serde(default)]
    pub body: String,
    /// Notes GitLab writes itself (pushes, label changes)
    #[serde(default)]
    pub system: bool,
}

/// `{api_url}/projects/{id}` with path-style ids encoded
pub fn gitlab_project_url(api_url: &str, project_id: &str) -> String {
    format!(
        "{}/projects/{}",
        api_url.trim_end_matches('/'),
        urlencoding::encode(project_id)
    )
}

fn request(client: &reqwest::Client, method: Method, url: &str, token: &str) -> RequestBuilder {
    client
        .request(method, url)
        .header("PRIVATE-TOKEN", token)
        .header("User-Agent", "galaxy")
}

/// Id of the note galaxy posted earlier, if any
pub fn find_gitlab_note(notes: &[Note]) -> Option<u64> {
    notes
        .iter()
        .find(|n| !n.system && has_marker(&n.body))
        .map(|n| n.id)
}

/// Post or refresh the coverage note on the opened merge request for `branch`
pub async fn update_mr(
    result: &ComparisonResult,
    branch: &str,
    api_url: &str,
    project_id: &str,
    api_key: &str,
) -> Result<()> {
    let client = reqwest::Client::new();
    let project_url = gitlab_project_url(api_url, project_id);

    let merge_requests: Vec<MergeRequest> = send_json(
        request(&client, Method::GET, &format!("{}/merge_requests", project_url), api_key)
            .query(&[("source_branch", branch), ("state", "opened")]),
        "GitLab merge request lookup",
    )
    .await?;

    let merge_request = merge_requests
        .first()
        .with_context(|| format!("No opened merge request found for branch {}", branch))?;

    let notes_url = format!("{}/merge_requests/{}/notes", project_url, merge_request.iid);

    let notes: Vec<Note> = send_json(
        request(&client, Method::GET, &notes_url, api_key).query(&[("per_page", "100")]),
        "GitLab note listing",
    )
    .await?;

    let payload = json!({ "body": build_comment(result, branch) });

    let _: serde_json::Value = match find_gitlab_note(&notes) {
        Some(id) => {
            send_json(
                request(&client, Method::PUT, &format!("{}/{}", notes_url, id), api_key).json(&payload),
                "GitLab note update",
            )
            .await?
        }
        None => {
            send_json(
                request(&client, Method::POST, &notes_url, api_key).json(&payload),
                "GitLab note creation",
            )
            .await?
        }
    };

    Ok(())
}
