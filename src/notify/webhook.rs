use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::USER_AGENT;
use crate::error::{Result, SentinelError};
use crate::store::{RunReport, RunStatus};

pub fn run_payload(report: &RunReport) -> Value {
    let status = if report.run.status == RunStatus::Completed {
        "PASSED"
    } else {
        "FAILED"
    };
    let failed_targets: Vec<Value> = report
        .failed_outcomes()
        .map(|o| {
            json!({
                "name": o.target_name,
                "address": o.target_address,
                "status": o.outcome.status,
                "similarity": o.outcome.similarity,
                "error": o.outcome.error,
            })
        })
        .collect();

    json!({
        "type": "run_completed",
        "data": {
            "run_id": report.run.id,
            "group_name": report.group_name,
            "status": status,
            "summary": report.run.summary,
            "failed_targets": failed_targets,
            "timestamp": report.run.completed_at.unwrap_or_else(Utc::now).to_rfc3339(),
        }
    })
}

pub fn test_payload() -> Value {
    json!({
        "type": "test",
        "data": {
            "message": "visual-sentinel webhook test",
            "timestamp": Utc::now().to_rfc3339(),
        }
    })
}

pub async fn post(client: &reqwest::Client, url: &str, payload: &Value) -> Result<()> {
    let resp = client
        .post(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .json(payload)
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .map_err(|e| SentinelError::Notification(format!("webhook {}: {}", url, e)))?;

    if !resp.status().is_success() {
        return Err(SentinelError::Notification(format!(
            "webhook {} returned {}",
            url,
            resp.status()
        )));
    }
    Ok(())
}
