use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Visual Sentinel: scheduled visual-regression checks for web pages.
#[derive(Parser, Debug, Clone)]
#[command(name = "visual-sentinel")]
pub struct CliArgs {
    /// Directory holding the database, artifacts, settings and logs
    #[arg(short = 'd', long = "data-dir", env = "VISUAL_SENTINEL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long = "port", env = "VISUAL_SENTINEL_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Base URL of the headless rendering service used for captures
    #[arg(
        short = 'c',
        long = "capture-endpoint",
        env = "VISUAL_SENTINEL_CAPTURE_ENDPOINT",
        default_value = DEFAULT_CAPTURE_ENDPOINT
    )]
    pub capture_endpoint: String,

    /// Upper bound for a single page capture, in seconds
    #[arg(
        long = "capture-timeout-secs",
        env = "VISUAL_SENTINEL_CAPTURE_TIMEOUT_SECS",
        default_value_t = CAPTURE_TIMEOUT_SECS
    )]
    pub capture_timeout_secs: u64,

    /// Per-pixel color tolerance (0.0 - 1.0) applied by the diff engine
    #[arg(
        long = "diff-tolerance",
        env = "VISUAL_SENTINEL_DIFF_TOLERANCE",
        default_value_t = DEFAULT_DIFF_TOLERANCE
    )]
    pub diff_tolerance: f64,

    /// Count anti-aliased edge pixels as differences
    #[arg(long = "include-aa", env = "VISUAL_SENTINEL_INCLUDE_AA")]
    pub include_aa: bool,

    /// Minimum age before an unfinished schedule run is treated as orphaned
    #[arg(
        long = "schedule-run-stale-secs",
        env = "VISUAL_SENTINEL_SCHEDULE_RUN_STALE_SECS",
        default_value_t = SCHEDULE_RUN_STALE_SECS
    )]
    pub schedule_run_stale_secs: u64,

    /// Days to keep non-baseline captures
    #[arg(
        long = "capture-retention-days",
        env = "VISUAL_SENTINEL_CAPTURE_RETENTION_DAYS",
        default_value_t = CAPTURE_RETENTION_DAYS,
        value_parser = clap::value_parser!(u32).range(1..=MAX_RETENTION_DAYS)
    )]
    pub capture_retention_days: u32,

    /// Days to keep diff images
    #[arg(
        long = "diff-retention-days",
        env = "VISUAL_SENTINEL_DIFF_RETENTION_DAYS",
        default_value_t = DIFF_RETENTION_DAYS,
        value_parser = clap::value_parser!(u32).range(1..=MAX_RETENTION_DAYS)
    )]
    pub diff_retention_days: u32,
}

#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub capture_endpoint: String,
    pub capture_timeout: Duration,
    pub diff_tolerance: f64,
    pub include_aa: bool,
    pub schedule_run_stale_after: Duration,
    pub capture_retention_days: u32,
    pub diff_retention_days: u32,
}

// Network constants
pub const DEFAULT_PORT: u16 = 9890;
pub const DEFAULT_CAPTURE_ENDPOINT: &str = "http://127.0.0.1:3000";
pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 30;
pub const USER_AGENT: &str = concat!("visual-sentinel/", env!("CARGO_PKG_VERSION"));

// Capture constants
pub const CAPTURE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1920;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 1080;
pub const DEFAULT_DEVICE_SCALE_FACTOR: f64 = 1.0;

// Comparison constants
pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const DEFAULT_DIFF_TOLERANCE: f64 = 0.1;
pub const DEFAULT_DIFF_ALPHA: f64 = 0.1;
pub const DIFF_COLOR: [u8; 3] = [255, 0, 0];
pub const AA_COLOR: [u8; 3] = [255, 255, 0];

// Scheduler constants
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const SCHEDULE_RUN_STALE_SECS: u64 = 1800; // 30 minutes

// Retention constants
pub const CAPTURE_RETENTION_DAYS: u32 = 30;
pub const DIFF_RETENTION_DAYS: u32 = 7;
/// Upper bound accepted for either retention window (about a century).
pub const MAX_RETENTION_DAYS: i64 = 36_500;
pub const RETENTION_SWEEP_INTERVAL_SECS: u64 = 6 * 3600;

// Log constants
pub const LOG_BUFFER_SIZE: usize = 500;

impl SentinelConfig {
    pub fn from_args(args: CliArgs) -> Self {
        let data_dir = args.data_dir.unwrap_or_else(default_data_dir);

        SentinelConfig {
            data_dir,
            port: args.port,
            capture_endpoint: args.capture_endpoint,
            capture_timeout: Duration::from_secs(args.capture_timeout_secs),
            diff_tolerance: args.diff_tolerance.clamp(0.0, 1.0),
            include_aa: args.include_aa,
            schedule_run_stale_after: Duration::from_secs(args.schedule_run_stale_secs),
            capture_retention_days: args.capture_retention_days,
            diff_retention_days: args.diff_retention_days,
        }
    }

    /// SQLite database holding groups, targets, runs and schedules
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("visual-sentinel.db")
    }

    /// Root of the capture and diff image store
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("visual-sentinel")
}
