#![allow(dead_code)]

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use visual_sentinel::artifacts::FsArtifactStore;
use visual_sentinel::capture::{CaptureProvider, CaptureRequest, CapturedImage};
use visual_sentinel::config::SentinelConfig;
use visual_sentinel::diff::DiffOptions;
use visual_sentinel::error::{Result, SentinelError};
use visual_sentinel::log_capture::LogState;
use visual_sentinel::notify::Notifier;
use visual_sentinel::orchestrator::RunOrchestrator;
use visual_sentinel::store::{Group, RunReport, RunStatus, SentinelDb, Target};

// ============================================================================
// Images
// ============================================================================

pub fn encode(img: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn solid(width: u32, height: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(px))
}

pub fn white(width: u32, height: u32) -> RgbaImage {
    solid(width, height, [255, 255, 255, 255])
}

/// White image with `k` isolated black pixels, two pixels apart so no two
/// share a neighborhood.
pub fn dotted(width: u32, height: u32, k: u32) -> RgbaImage {
    let mut img = white(width, height);
    let mut placed = 0;
    'outer: for y in (0..height).step_by(2) {
        for x in (0..width).step_by(2) {
            if placed == k {
                break 'outer;
            }
            img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            placed += 1;
        }
    }
    assert_eq!(placed, k, "image too small for {} dots", k);
    img
}

// ============================================================================
// Fake capture provider
// ============================================================================

/// Returns preset PNGs per address (white 10x10 otherwise). Addresses can
/// be made to fail, and captures can be held at a gate.
pub struct FakeCapture {
    images: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    unreachable: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: AtomicUsize,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            unreachable: AtomicBool::new(false),
            gate: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_image(&self, address: &str, img: &RgbaImage) {
        self.images.lock().insert(address.to_string(), encode(img));
    }

    pub fn fail(&self, address: &str) {
        self.failing.lock().insert(address.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Hold every capture until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn open_gate(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..500 {
            if self.calls() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} captures, saw {}", n, self.calls());
    }
}

#[async_trait]
impl CaptureProvider for FakeCapture {
    async fn ready(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SentinelError::Capture("capture service unreachable".into()));
        }
        Ok(())
    }

    async fn capture(&self, request: &CaptureRequest) -> Result<CapturedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }

        if self.failing.lock().contains(&request.address) {
            return Err(SentinelError::Capture(format!(
                "navigation to {} failed",
                request.address
            )));
        }
        let bytes = self
            .images
            .lock()
            .get(&request.address)
            .cloned()
            .unwrap_or_else(|| encode(&white(10, 10)));
        CapturedImage::from_encoded(bytes)
    }
}

// ============================================================================
// Recording notifier
// ============================================================================

pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<(String, RunStatus)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        let notifier = Self::new();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &RunReport) -> Result<()> {
        self.delivered
            .lock()
            .push((report.run.id.clone(), report.run.status));
        if self.fail.load(Ordering::SeqCst) {
            return Err(SentinelError::Notification("smtp connection refused".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub db: Arc<SentinelDb>,
    pub artifacts: Arc<FsArtifactStore>,
    pub capture: Arc<FakeCapture>,
    pub notifier: Arc<RecordingNotifier>,
    pub logs: Arc<LogState>,
    pub orchestrator: Arc<RunOrchestrator>,
}

pub fn harness() -> Harness {
    harness_with(RecordingNotifier::new())
}

pub fn harness_with(notifier: RecordingNotifier) -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(SentinelDb::open(&dir.path().join("test.db")).unwrap());
    let artifacts = Arc::new(FsArtifactStore::new(dir.path().join("artifacts")).unwrap());
    let capture = Arc::new(FakeCapture::new());
    let notifier = Arc::new(notifier);
    let logs = Arc::new(LogState::new());
    let orchestrator = Arc::new(RunOrchestrator::new(
        db.clone(),
        capture.clone(),
        artifacts.clone(),
        notifier.clone(),
        logs.clone(),
        DiffOptions::default(),
        Duration::from_secs(5),
    ));
    Harness {
        dir,
        db,
        artifacts,
        capture,
        notifier,
        logs,
        orchestrator,
    }
}

pub fn address(i: usize) -> String {
    format!("https://example.com/page-{}", i)
}

/// Group with `n` active targets at [`address`]`(0..n)`.
pub fn seed_group(db: &SentinelDb, n: usize) -> (Group, Vec<Target>) {
    let group = Group::new("Landing pages");
    db.insert_group(&group).unwrap();
    let targets = (0..n)
        .map(|i| {
            let mut target = Target::new(&group.id, format!("page {}", i), address(i));
            target.position = i as i64;
            db.insert_target(&target).unwrap();
            target
        })
        .collect();
    (group, targets)
}

pub fn test_config(data_dir: PathBuf) -> SentinelConfig {
    SentinelConfig {
        data_dir,
        port: 0,
        capture_endpoint: "http://127.0.0.1:1".to_string(),
        capture_timeout: Duration::from_secs(5),
        diff_tolerance: 0.1,
        include_aa: false,
        schedule_run_stale_after: Duration::from_secs(1800),
        capture_retention_days: 30,
        diff_retention_days: 7,
    }
}
