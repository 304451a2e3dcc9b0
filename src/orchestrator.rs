use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::artifacts::{ArtifactKind, ArtifactStore};
use crate::capture::{CaptureProvider, CaptureRequest, CapturedImage};
use crate::comparison::ComparisonCoordinator;
use crate::diff::DiffOptions;
use crate::error::{Result, SentinelError};
use crate::log_capture::{LogLevel, LogSource, LogState};
use crate::notify::Notifier;
use crate::store::queries::run_report;
use crate::store::{
    Capture, Group, Outcome, Run, RunReport, RunStatus, RunSummary, SentinelDb, Target,
    TriggerType,
};

/// Drives one pass over a group: capture, compare and record every active
/// target, settle the run's terminal status, then decide on notification.
pub struct RunOrchestrator {
    db: Arc<SentinelDb>,
    capture: Arc<dyn CaptureProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    notifier: Arc<dyn Notifier>,
    coordinator: ComparisonCoordinator,
    logs: Arc<LogState>,
    capture_timeout: Duration,
}

impl RunOrchestrator {
    pub fn new(
        db: Arc<SentinelDb>,
        capture: Arc<dyn CaptureProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        notifier: Arc<dyn Notifier>,
        logs: Arc<LogState>,
        diff_options: DiffOptions,
        capture_timeout: Duration,
    ) -> Self {
        let coordinator = ComparisonCoordinator::new(db.clone(), artifacts.clone(), diff_options);
        Self {
            db,
            capture,
            artifacts,
            notifier,
            coordinator,
            logs,
            capture_timeout,
        }
    }

    pub fn db(&self) -> &Arc<SentinelDb> {
        &self.db
    }

    /// Manual trigger. Validates the group, records a pending run and
    /// executes it in the background.
    pub async fn start_run(self: &Arc<Self>, group_id: &str) -> Result<String> {
        let group = self.db.require_group(group_id)?;
        if self.db.list_active_targets(&group.id)?.is_empty() {
            return Err(SentinelError::Configuration(format!(
                "group '{}' has no active targets",
                group.name
            )));
        }

        let run = Run::new(&group.id, RunStatus::Pending, TriggerType::Manual);
        self.db.insert_run(&run)?;
        let run_id = run.id.clone();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.execute(&run).await {
                error!("Manual run {} failed: {}", run.id, e);
            }
        });

        Ok(run_id)
    }

    /// Record a run that starts executing immediately.
    pub fn begin_run(&self, group_id: &str, trigger: TriggerType) -> Result<Run> {
        let group = self.db.require_group(group_id)?;
        let run = Run::new(&group.id, RunStatus::Running, trigger);
        self.db.insert_run(&run)?;
        Ok(run)
    }

    /// Execute a recorded run to its terminal status.
    ///
    /// Per-target problems become `error` outcomes and do not fail the
    /// pass. Anything that aborts the pass itself finishes the run with the
    /// trigger's failure status and comes back as [`SentinelError::RunFailure`].
    pub async fn execute(&self, run: &Run) -> Result<RunReport> {
        self.logs
            .emit(
                LogSource::Orchestrator,
                LogLevel::Info,
                format!("Run {} started ({})", run.id, run.trigger),
            )
            .await;

        let pass = self.run_pass(run).await;

        let (status, summary, failure) = match pass {
            Ok(summary) => (summary.terminal_status(), summary, None),
            Err(e) => {
                let recorded = self.db.outcomes_for_run(&run.id).unwrap_or_default();
                let summary = RunSummary::tally(&recorded).with_error(e.to_string());
                (run.trigger.failure_status(), summary, Some(e))
            }
        };

        if !self.db.finish_run(&run.id, status, &summary)? {
            warn!("Run {} was already terminal; status left unchanged", run.id);
        }

        match &failure {
            None => {
                info!(
                    "Run {} finished {}: {} passed, {} failed, {} errors",
                    run.id, status, summary.passed, summary.failed, summary.errors
                );
                self.logs
                    .emit(
                        LogSource::Orchestrator,
                        LogLevel::Info,
                        format!(
                            "Run {} {}: {}/{} passed",
                            run.id, status, summary.passed, summary.total
                        ),
                    )
                    .await;
            }
            Some(e) => {
                error!("Run {} aborted: {}", run.id, e);
                self.logs
                    .emit(
                        LogSource::Orchestrator,
                        LogLevel::Error,
                        format!("Run {} aborted: {}", run.id, e),
                    )
                    .await;
            }
        }

        let report = run_report(&self.db, &run.id)?
            .ok_or_else(|| SentinelError::NotFound(format!("run {}", run.id)))?;
        self.maybe_notify(&report).await;

        match failure {
            Some(e) => Err(SentinelError::RunFailure(e.to_string())),
            None => Ok(report),
        }
    }

    async fn run_pass(&self, run: &Run) -> Result<RunSummary> {
        if run.status == RunStatus::Pending {
            self.db.mark_running(&run.id)?;
        }
        let group = self.db.require_group(&run.group_id)?;
        let targets = self.db.list_active_targets(&group.id)?;
        self.capture.ready().await?;

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in &targets {
            let mut outcome = self.process_target(&run.id, &group, target).await;
            outcome.id = self.db.insert_outcome(&outcome)?;
            outcomes.push(outcome);
        }

        Ok(RunSummary::tally(&outcomes))
    }

    async fn process_target(&self, run_id: &str, group: &Group, target: &Target) -> Outcome {
        let current = match self.capture_and_store(group, target).await {
            Ok(capture) => capture,
            Err(e) => {
                warn!("Capture failed for target {} ({}): {}", target.name, target.address, e);
                self.logs
                    .emit(
                        LogSource::Orchestrator,
                        LogLevel::Warn,
                        format!("Target {} not captured: {}", target.name, e),
                    )
                    .await;
                return self
                    .coordinator
                    .contained(run_id, target, group.default_threshold, &e);
            }
        };

        let baseline = match self.db.current_baseline(&target.id) {
            Ok(baseline) => baseline,
            Err(e) => {
                return self
                    .coordinator
                    .contained(run_id, target, group.default_threshold, &e)
            }
        };

        self.coordinator
            .evaluate(
                run_id,
                target,
                group.default_threshold,
                &current,
                baseline.as_ref(),
            )
            .await
    }

    async fn capture_and_store(&self, group: &Group, target: &Target) -> Result<Capture> {
        let request = CaptureRequest {
            address: target.address.clone(),
            viewport: target.resolve_viewport(group),
            pre_script: target.pre_script.clone(),
            timeout: self.capture_timeout,
        };

        let image = tokio::time::timeout(self.capture_timeout, self.capture.capture(&request))
            .await
            .map_err(|_| {
                SentinelError::Timeout(format!(
                    "capturing {} took longer than {:?}",
                    target.address, self.capture_timeout
                ))
            })??;

        self.store_capture(target, image).await
    }

    async fn store_capture(&self, target: &Target, image: CapturedImage) -> Result<Capture> {
        let id = uuid::Uuid::new_v4().to_string();
        let locator = self
            .artifacts
            .put(ArtifactKind::Capture, &target.id, &id, &image.bytes)
            .await?;
        let capture = Capture {
            id,
            target_id: target.id.clone(),
            locator,
            is_baseline: false,
            width: image.width,
            height: image.height,
            digest: image.digest,
            created_at: Utc::now(),
        };
        self.db.insert_capture(&capture)?;
        Ok(capture)
    }

    async fn maybe_notify(&self, report: &RunReport) {
        let policy = match self.db.get_group(&report.run.group_id) {
            Ok(Some(group)) => group.notification_policy(),
            Ok(None) => return,
            Err(e) => {
                warn!("Could not load notification policy for run {}: {}", report.run.id, e);
                return;
            }
        };
        if !policy.should_notify(report.run.status) {
            return;
        }

        if let Err(e) = self.notifier.notify(report).await {
            warn!("Notification for run {} failed: {}", report.run.id, e);
            self.logs
                .emit(
                    LogSource::Notifier,
                    LogLevel::Warn,
                    format!("Notification for run {} failed: {}", report.run.id, e),
                )
                .await;
        }
    }

    // ========================================================================
    // Baseline management
    // ========================================================================

    /// Capture the target now and make that capture its baseline.
    pub async fn capture_baseline(&self, target_id: &str) -> Result<Capture> {
        let target = self
            .db
            .get_target(target_id)?
            .ok_or_else(|| SentinelError::NotFound(format!("target {}", target_id)))?;
        let group = self.db.require_group(&target.group_id)?;

        let capture = self.capture_and_store(&group, &target).await?;
        let adopted = self.db.adopt_baseline(&capture.id)?;
        info!("New baseline {} for target {}", adopted.id, target.name);
        Ok(adopted)
    }

    /// Make an existing capture the baseline of its target.
    pub fn promote_capture(&self, capture_id: &str) -> Result<Capture> {
        let adopted = self.db.adopt_baseline(capture_id)?;
        info!("Promoted capture {} to baseline", capture_id);
        Ok(adopted)
    }
}
