use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use visual_sentinel::artifacts::FsArtifactStore;
use visual_sentinel::capture::HttpCaptureProvider;
use visual_sentinel::config::{CliArgs, SentinelConfig, HTTP_CLIENT_TIMEOUT_SECS, USER_AGENT};
use visual_sentinel::log_capture::{LogLevel, LogSource};
use visual_sentinel::retention::spawn_retention_sweeper;
use visual_sentinel::server;
use visual_sentinel::state::{AppState, SharedState};
use visual_sentinel::store::SentinelDb;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = SentinelConfig::from_args(args);
    std::fs::create_dir_all(&config.data_dir)?;

    // Stdout plus a daily-rolling file; the guard flushes on exit.
    let file_appender = tracing_appender::rolling::daily(config.logs_dir(), "visual-sentinel.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visual_sentinel=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!("Starting visual-sentinel v{}", env!("CARGO_PKG_VERSION"));
    info!("Data dir: {:?}", config.data_dir);
    info!("Capture endpoint: {}", config.capture_endpoint);

    let db = Arc::new(SentinelDb::open(&config.database_path())?);
    let artifacts = Arc::new(FsArtifactStore::new(config.artifacts_dir())?);
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()?;
    let capture = Arc::new(HttpCaptureProvider::new(
        http_client.clone(),
        config.capture_endpoint.clone(),
    ));

    let port = config.port;
    let capture_days = config.capture_retention_days;
    let diff_days = config.diff_retention_days;
    let state: SharedState = Arc::new(AppState::new(
        config,
        db.clone(),
        capture,
        artifacts.clone(),
        http_client,
    ));

    let loaded = state.scheduler.load_enabled().await?;
    state
        .logs
        .emit(
            LogSource::Scheduler,
            LogLevel::Info,
            format!("Loaded {} schedules", loaded),
        )
        .await;

    let _retention_handle =
        spawn_retention_sweeper(db, artifacts, state.logs.clone(), capture_days, diff_days);

    let router = server::build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("visual-sentinel listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    info!("visual-sentinel shutting down");
    state.scheduler.shutdown();

    Ok(())
}

async fn shutdown_signal(state: SharedState) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
    state
        .logs
        .emit(LogSource::Api, LogLevel::Info, "Shutdown signal received")
        .await;
}
