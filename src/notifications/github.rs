//! GitHub pull request comments

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;

use super::{build_comment, has_marker, send_json};
use crate::compare::ComparisonResult;

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, Deserialize)]
struct PullRequest {
    number: u64,
}

#[derive(Debug, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

pub fn github_repo_url(owner: &str, repo: &str) -> String {
    format!("{}/repos/{}/{}", GITHUB_API, owner, repo)
}

fn request(client: &reqwest::Client, method: Method, url: &str, token: &str) -> RequestBuilder {
    client
        .request(method, url)
        .header("Authorization", format!("token {}", token))
        .header("User-Agent", "galaxy")
        .header("Accept", "application/vnd.github.v3+json")
}

/// Id of the comment galaxy posted earlier, if any
pub fn find_github_comment(comments: &[IssueComment]) -> Option<u64> {
    comments
        .iter()
        .find(|c| c.body.as_deref().map(has_marker).unwrap_or(false))
        .map(|c| c.id)
}

/// Post or refresh the coverage comment on the open pull request for `branch`
pub async fn update_pr(
    result: &ComparisonResult,
    branch: &str,
    owner: &str,
    repo: &str,
    api_key: &str,
) -> Result<()> {
    let client = reqwest::Client::new();
    let repo_url = github_repo_url(owner, repo);

    let head = format!("{}:{}", owner, branch);
    let pulls: Vec<PullRequest> = send_json(
        request(&client, Method::GET, &format!("{}/pulls", repo_url), api_key)
            .query(&[("head", head.as_str()), ("state", "open")]),
        "GitHub pull request lookup",
    )
    .await?;

    let pull = pulls
        .first()
        .with_context(|| format!("No open pull request found for branch {}", branch))?;

    let comments: Vec<IssueComment> = send_json(
        request(
            &client,
            Method::GET,
            &format!("{}/issues/{}/comments", repo_url, pull.number),
            api_key,
        )
        .query(&[("per_page", "100")]),
        "GitHub comment listing",
    )
    .await?;

    let payload = json!({ "body": build_comment(result, branch) });

    let _: serde_json::Value = match find_github_comment(&comments) {
        Some(id) => {
            send_json(
                request(&client, Method::PATCH, &format!("{}/issues/comments/{}", repo_url, id), api_key)
                    .json(&payload),
                "GitHub comment update",
            )
            .await?
        }
        None => {
            send_json(
                request(
                    &client,
                    Method::POST,
                    &format!("{}/issues/{}/comments", repo_url, pull.number),
                    api_key,
                )
                .json(&payload),
                "GitHub comment creation",
            )
            .await?
        }
    };

    Ok(())
}
