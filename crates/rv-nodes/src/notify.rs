// SPDX-License-Identifier: MIT OR Apache-2.0
//! Notify node (§4.6): posts a best-effort summary. Transport failures are
//! logged, never escalated — a broken webhook must not fail the job.

use async_trait::async_trait;
use rv_error::RvError;
use rv_runtime::{NodeContext, NodeOutcome, TypedNode, ValidationOutcome};
use rv_stream::Summary;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Formats and best-effort posts a job summary to a webhook URL.
///
/// `failure_only` skips the post entirely when nothing mismatched or
/// failed (§8: "Notify is skipped when configured as failure-only" on an
/// empty catalog).
pub struct NotifyNode {
    client: reqwest::Client,
    webhook_url: Option<String>,
    failure_only: bool,
}

impl NotifyNode {
    /// Build a Notify node posting to `webhook_url`, or a no-op sink when
    /// `None`.
    #[must_use]
    pub fn new(webhook_url: Option<String>, failure_only: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
            failure_only,
        }
    }
}

#[async_trait]
impl TypedNode for NotifyNode {
    fn type_name(&self) -> &str {
        "notify"
    }

    fn validate(&self, _input: &Value) -> ValidationOutcome {
        ValidationOutcome::ok()
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let Some(save_result) = ctx.shared.save_result().await else {
            return Ok(NodeOutcome::success(json!({ "products": input["products"], "notified": false })));
        };

        let has_issues = save_result.summary.mismatched > 0 || save_result.summary.by_status.get("failed").copied().unwrap_or(0) > 0;
        if self.failure_only && !has_issues {
            return Ok(NodeOutcome::success(json!({
                "products": input["products"],
                "notified": false,
                "reason": "no issues, failure_only mode",
            })));
        }

        let emoji = severity_emoji(&save_result.summary);
        let message = format_message(&save_result.summary, &save_result.file_path.display().to_string(), emoji);

        let notified = match &self.webhook_url {
            None => false,
            Some(url) => self.post(url, &message).await,
        };

        Ok(NodeOutcome::success(json!({
            "products": input["products"],
            "notified": notified,
            "message": message,
        })))
    }
}

impl NotifyNode {
    async fn post(&self, url: &str, message: &str) -> bool {
        let body = json!({ "text": message });
        match self.client.post(url).timeout(REQUEST_TIMEOUT).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "notify webhook returned non-success (ignored)");
                false
            }
            Err(e) => {
                warn!(error = %e, "notify webhook request failed (ignored)");
                false
            }
        }
    }
}

/// Severity emoji chosen by mismatch/failure thresholds (§4.6, §8).
///
/// `✅` is reserved for a genuinely perfect run (every record a matching
/// success) — a run with no mismatches and no failures but some
/// `not_found` records (§8 scenario 3) is still informational, not clean,
/// so it falls through to `📊` rather than `✅`.
#[must_use]
fn severity_emoji(summary: &Summary) -> &'static str {
    if summary.total == 0 {
        return "📊";
    }
    let failure_rate = summary.by_status.get("failed").copied().unwrap_or(0) as f64 / summary.total as f64;
    if failure_rate > 0.10 {
        "🚨"
    } else if summary.mismatched > 0 {
        "⚠️"
    } else if summary.matched == summary.total {
        "✅"
    } else {
        "📊"
    }
}

fn format_message(summary: &Summary, file_path: &str, emoji: &str) -> String {
    let match_rate = if summary.total == 0 {
        100.0
    } else {
        100.0 * summary.matched as f64 / summary.total as f64
    };
    format!(
        "{emoji} validation complete — {} total, {:.1}% match, success={} failed={} not_found={} — {}",
        summary.total,
        match_rate,
        summary.by_status.get("success").copied().unwrap_or(0),
        summary.by_status.get("failed").copied().unwrap_or(0),
        summary.by_status.get("not_found").copied().unwrap_or(0),
        file_path,
    )
}
