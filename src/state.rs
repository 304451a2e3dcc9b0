use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::artifacts::ArtifactStore;
use crate::capture::CaptureProvider;
use crate::config::SentinelConfig;
use crate::diff::DiffOptions;
use crate::log_capture::LogState;
use crate::notify::NotificationDispatcher;
use crate::orchestrator::RunOrchestrator;
use crate::scheduler::Scheduler;
use crate::settings::{load_settings, settings_path, NotificationSettings};
use crate::store::SentinelDb;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: SentinelConfig,
    pub db: Arc<SentinelDb>,
    pub capture: Arc<dyn CaptureProvider>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub orchestrator: Arc<RunOrchestrator>,
    pub scheduler: Scheduler,
    pub notifier: Arc<NotificationDispatcher>,
    pub settings: Arc<RwLock<NotificationSettings>>,
    pub settings_path: PathBuf,
    pub logs: Arc<LogState>,
}

impl AppState {
    /// Wire the orchestrator, scheduler and notifier around the given
    /// store and collaborators.
    pub fn new(
        config: SentinelConfig,
        db: Arc<SentinelDb>,
        capture: Arc<dyn CaptureProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        http_client: reqwest::Client,
    ) -> Self {
        let settings_path = settings_path(&config);
        let settings = Arc::new(RwLock::new(load_settings(&settings_path)));
        let logs = Arc::new(LogState::new());
        let notifier = Arc::new(NotificationDispatcher::new(http_client, settings.clone()));

        let diff_options = DiffOptions {
            tolerance: config.diff_tolerance,
            include_aa: config.include_aa,
            ..DiffOptions::default()
        };
        let orchestrator = Arc::new(RunOrchestrator::new(
            db.clone(),
            capture.clone(),
            artifacts.clone(),
            notifier.clone(),
            logs.clone(),
            diff_options,
            config.capture_timeout,
        ));
        let scheduler = Scheduler::new(
            db.clone(),
            orchestrator.clone(),
            logs.clone(),
            config.schedule_run_stale_after,
        );

        Self {
            config,
            db,
            capture,
            artifacts,
            orchestrator,
            scheduler,
            notifier,
            settings,
            settings_path,
            logs,
        }
    }
}
