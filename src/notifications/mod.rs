//! Notifications module
//!
//! Provides:
//! - GitHub pull request comments
//! - GitLab merge request notes
//! - Slack webhook summaries

mod github;
mod gitlab;
mod slack;

pub use github::*;
pub use gitlab::*;
pub use slack::*;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use tokio::task::JoinHandle;

use crate::compare::ComparisonResult;
use crate::config::{non_empty, GalaxySettings};
use crate::console;

/// Hidden marker identifying the comment galaxy owns on a PR/MR
pub const COMMENT_MARKER: &str = "<!-- galaxy-coverage -->";

/// Where the comparison gets posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Github { owner: String, repo: String },
    Gitlab { api_url: String, project_id: String },
}

impl Target {
    fn describe(&self) -> &'static str {
        match self {
            Target::Github { .. } => "Pull request comment",
            Target::Gitlab { .. } => "Merge request note",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    InvalidApi(String),
    MissingField { api: &'static str, field: &'static str },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::InvalidApi(api) => write!(f, "Invalid API -- cannot update MR/PR {}", api),
            RouteError::MissingField { api, field } => {
                write!(f, "{} is required for the {} API -- cannot update MR/PR", field, api)
            }
        }
    }
}

fn required(value: &Option<String>, api: &'static str, field: &'static str) -> std::result::Result<String, RouteError> {
    non_empty(value.as_deref())
        .map(str::to_string)
        .ok_or(RouteError::MissingField { api, field })
}

/// Pick the integration named by `settings.api`
pub fn route(settings: &GalaxySettings) -> std::result::Result<Target, RouteError> {
    match settings.api() {
        Some("github") => Ok(Target::Github {
            owner: required(&settings.owner, "github", "owner")?,
            repo: required(&settings.repo, "github", "repo")?,
        }),
        Some("gitlab") => Ok(Target::Gitlab {
            api_url: required(&settings.gitlab_api_url, "gitlab", "gitlabApiUrl")?,
            project_id: required(&settings.gitlab_project_id, "gitlab", "gitlabProjectId")?,
        }),
        other => Err(RouteError::InvalidApi(other.unwrap_or_default().to_string())),
    }
}

/// Markdown body for the PR/MR comment
pub fn build_comment(result: &ComparisonResult, branch: &str) -> String {
    let mut body = format!("{}\n### Coverage report for `{}`\n\n", COMMENT_MARKER, branch);
    body.push_str(&format!("**Overall coverage:** {}\n\n", result.coverage));

    if result.files.is_empty() {
        body.push_str("_No changed files with coverage data._\n");
    } else {
        body.push_str("| File | Coverage change |\n| --- | --- |\n");
        for file in &result.files {
            body.push_str(&format!("| `{}` | {} |\n", file.name, file.diff));
        }
    }

    body.push_str(&format!("\n_Updated {}_\n", Utc::now().format("%Y-%m-%d %H:%M UTC")));
    body
}

pub(crate) fn has_marker(body: &str) -> bool {
    body.contains(COMMENT_MARKER)
}

/// Send a request and decode the JSON reply, failing on non-2xx statuses
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    action: &str,
) -> Result<T> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("{} failed: {} - {}", action, status, text);
    }

    Ok(response.json().await?)
}

/// Notifier tasks started by [`dispatch`]
#[derive(Debug, Default)]
pub struct PendingNotifications {
    handles: Vec<JoinHandle<()>>,
}

impl PendingNotifications {
    fn spawn<F>(&mut self, label: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.handles.push(tokio::spawn(async move {
            match task.await {
                Ok(()) => console::info(format!("{} updated", label)),
                Err(e) => console::error(format!("{} failed: {:#}", label, e)),
            }
        }));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every spawned notifier to finish
    pub async fn wait(self) {
        for outcome in join_all(self.handles).await {
            if let Err(e) = outcome {
                console::error(format!("Notification task aborted: {}", e));
            }
        }
    }
}

/// Inputs to a notification besides the comparison itself
#[derive(Debug, Clone, Copy, Default)]
pub struct Notify<'a> {
    pub project: &'a str,
    pub branch: &'a str,
    pub api_key: Option<&'a str>,
    pub hook_url: Option<&'a str>,
    pub channel: Option<&'a str>,
}

async fn update_target(target: Target, result: ComparisonResult, branch: String, api_key: String) -> Result<()> {
    match target {
        Target::Github { owner, repo } => update_pr(&result, &branch, &owner, &repo, &api_key).await,
        Target::Gitlab { api_url, project_id } => {
            update_mr(&result, &branch, &api_url, &project_id, &api_key).await
        }
    }
}

/// Start the PR/MR update (and the Slack summary when a hook is set) without awaiting them
pub fn dispatch(settings: &GalaxySettings, result: &ComparisonResult, notify: &Notify<'_>) -> PendingNotifications {
    let mut pending = PendingNotifications::default();

    match route(settings) {
        Ok(target) => match non_empty(notify.api_key) {
            Some(api_key) => {
                let label = target.describe();
                pending.spawn(
                    label,
                    update_target(target, result.clone(), notify.branch.to_string(), api_key.to_string()),
                );
            }
            None => console::warn("api key was not supplied -- cannot update MR/PR"),
        },
        Err(e) => console::warn(e),
    }

    if let Some(hook_url) = non_empty(notify.hook_url) {
        let payload = build_slack_payload(result, notify.project, notify.branch, non_empty(notify.channel));
        pending.spawn("Slack summary", send_slack_payload(hook_url.to_string(), payload));
    }

    pending
}
