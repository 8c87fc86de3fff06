//! Slack webhook summaries

use anyhow::Result;
use serde_json::json;

use crate::compare::ComparisonResult;

const MAX_LISTED_FILES: usize = 10;

/// Build the Slack Block Kit message for a comparison
pub fn build_slack_payload(
    result: &ComparisonResult,
    project_name: &str,
    branch: &str,
    channel: Option<&str>,
) -> serde_json::Value {
    let headline = format!("{} on {}: {}", project_name, branch, result.coverage);

    let file_list = if result.files.is_empty() {
        "_No changed files with coverage data_".to_string()
    } else {
        let mut list = result
            .files
            .iter()
            .take(MAX_LISTED_FILES)
            .map(|f| format!("• `{}` {}", f.name, f.diff))
            .collect::<Vec<_>>()
            .join("\n");

        if result.files.len() > MAX_LISTED_FILES {
            list.push_str(&format!("\n_...and {} more_", result.files.len() - MAX_LISTED_FILES));
        }
        list
    };

    let mut payload = json!({
        "text": format!("Coverage {}", headline),
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("Coverage: {}", headline),
                    "emoji": true
                }
            },
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": format!("*Changed files:*\n{}", file_list)
                }
            }
        ]
    });

    if let Some(channel) = channel {
        payload["channel"] = json!(channel);
    }

    payload
}

/// Post a prepared payload to a Slack webhook
pub async fn send_slack_payload(webhook_url: String, payload: serde_json::Value) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client.post(&webhook_url).json(&payload).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("Slack webhook failed: {} - {}", status, text);
    }

    Ok(())
}
