use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::artifacts::ArtifactStore;
use crate::config::RETENTION_SWEEP_INTERVAL_SECS;
use crate::error::Result;
use crate::log_capture::{LogLevel, LogSource, LogState};
use crate::store::SentinelDb;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub captures_removed: usize,
    pub diffs_removed: usize,
}

/// Delete non-baseline captures older than `capture_days` and diff images
/// older than `diff_days`. Baselines are never touched.
///
/// Rows go first. A capture promoted to baseline after the stale query keeps
/// its row, so its file is left alone too.
pub async fn sweep(
    db: &SentinelDb,
    artifacts: &dyn ArtifactStore,
    capture_days: u32,
    diff_days: u32,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for capture in db.stale_captures(cutoff(capture_days))? {
        if !db.delete_capture(&capture.id)? {
            continue;
        }
        report.captures_removed += 1;
        if let Err(e) = artifacts.remove(&capture.locator).await {
            warn!("Could not remove capture artifact {}: {}", capture.locator, e);
        }
    }

    for (outcome_id, locator) in db.stale_diff_locators(cutoff(diff_days))? {
        db.clear_diff_locator(outcome_id)?;
        report.diffs_removed += 1;
        if let Err(e) = artifacts.remove(&locator).await {
            warn!("Could not remove diff artifact {}: {}", locator, e);
        }
    }

    Ok(report)
}

fn cutoff(days: u32) -> DateTime<Utc> {
    Utc::now()
        .checked_sub_signed(chrono::Duration::days(i64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Remove files whose rows are already gone. Returns how many were removed.
pub async fn purge_artifacts(artifacts: &dyn ArtifactStore, locators: &[String]) -> usize {
    let mut removed = 0;
    for locator in locators {
        match artifacts.remove(locator).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Could not remove artifact {}: {}", locator, e),
        }
    }
    removed
}

pub fn spawn_retention_sweeper(
    db: Arc<SentinelDb>,
    artifacts: Arc<dyn ArtifactStore>,
    logs: Arc<LogState>,
    capture_days: u32,
    diff_days: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(RETENTION_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match sweep(&db, artifacts.as_ref(), capture_days, diff_days).await {
                Ok(report) => {
                    if report.captures_removed + report.diffs_removed > 0 {
                        info!(
                            "Retention sweep removed {} captures and {} diffs",
                            report.captures_removed, report.diffs_removed
                        );
                        logs.emit(
                            LogSource::Retention,
                            LogLevel::Info,
                            format!(
                                "Removed {} old captures and {} old diffs",
                                report.captures_removed, report.diffs_removed
                            ),
                        )
                        .await;
                    }
                }
                Err(e) => {
                    warn!("Retention sweep failed: {}", e);
                    logs.emit(
                        LogSource::Retention,
                        LogLevel::Warn,
                        format!("Retention sweep failed: {}", e),
                    )
                    .await;
                }
            }
        }
    })
}
