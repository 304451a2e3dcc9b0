use chrono::Utc;
use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::artifacts::{ArtifactKind, ArtifactStore};
use crate::diff::{self, DiffOptions, DiffOutput};
use crate::error::{Result, SentinelError};
use crate::store::{Capture, Outcome, OutcomeStatus, SentinelDb, Target, ThresholdSource};

/// Result of diffing two encoded images.
#[derive(Debug, Clone)]
pub struct EncodedDiff {
    pub differing_pixels: u64,
    pub total_pixels: u64,
    /// PNG-encoded mask, present only when pixels differ.
    pub mask_png: Option<Vec<u8>>,
}

fn decode(bytes: &[u8], which: &str) -> Result<RgbaImage> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| SentinelError::Decode(format!("{} image: {}", which, e)))
}

/// Stretch `img` to exactly `width` x `height`. Never crops.
pub fn resize_to_match(img: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.dimensions() == (width, height) {
        return img;
    }
    image::imageops::resize(&img, width, height, FilterType::Triangle)
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Decode both images, bring the current one to the baseline's size and
/// diff them. CPU bound; run it off the async workers.
pub fn compare_encoded(baseline: &[u8], current: &[u8], options: &DiffOptions) -> Result<EncodedDiff> {
    let base = decode(baseline, "baseline")?;
    let (width, height) = base.dimensions();
    let cur = resize_to_match(decode(current, "current")?, width, height);

    let DiffOutput {
        differing_pixels,
        mask,
    } = diff::compare(base.as_raw(), cur.as_raw(), width, height, options)?;

    let mask_png = mask.as_ref().map(encode_png).transpose()?;

    Ok(EncodedDiff {
        differing_pixels,
        total_pixels: DiffOutput::total_pixels(width, height),
        mask_png,
    })
}

/// Turns a target's current capture and its baseline into an [`Outcome`].
pub struct ComparisonCoordinator {
    db: Arc<SentinelDb>,
    artifacts: Arc<dyn ArtifactStore>,
    options: DiffOptions,
}

impl ComparisonCoordinator {
    pub fn new(db: Arc<SentinelDb>, artifacts: Arc<dyn ArtifactStore>, options: DiffOptions) -> Self {
        Self {
            db,
            artifacts,
            options,
        }
    }

    /// Never fails: any error is folded into an `error` outcome carrying
    /// the threshold that would have applied.
    pub async fn evaluate(
        &self,
        run_id: &str,
        target: &Target,
        group_default: f64,
        current: &Capture,
        baseline: Option<&Capture>,
    ) -> Outcome {
        let (threshold, source) = target.resolve_threshold(group_default);
        match self
            .try_evaluate(run_id, target, threshold, source, current, baseline)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Comparison failed for target {}: {}", target.name, e);
                Outcome::errored(run_id, &target.id, threshold, source, &e)
            }
        }
    }

    /// Outcome for a target that could not be captured at all.
    pub fn contained(&self, run_id: &str, target: &Target, group_default: f64, error: &SentinelError) -> Outcome {
        let (threshold, source) = target.resolve_threshold(group_default);
        Outcome::errored(run_id, &target.id, threshold, source, error)
    }

    async fn try_evaluate(
        &self,
        run_id: &str,
        target: &Target,
        threshold: f64,
        source: ThresholdSource,
        current: &Capture,
        baseline: Option<&Capture>,
    ) -> Result<Outcome> {
        let total_pixels = DiffOutput::total_pixels(current.width, current.height);
        let mut outcome = Outcome {
            id: 0,
            run_id: run_id.to_string(),
            target_id: target.id.clone(),
            status: OutcomeStatus::Passed,
            similarity: 1.0,
            diff_pixels: 0,
            total_pixels,
            threshold_used: threshold,
            threshold_source: source,
            baseline_locator: None,
            current_locator: Some(current.locator.clone()),
            diff_locator: None,
            error: None,
            created_at: Utc::now(),
        };

        let Some(baseline) = baseline else {
            let adopted = self.db.adopt_baseline(&current.id)?;
            info!("Adopted first baseline for target {}", target.name);
            outcome.baseline_locator = Some(adopted.locator);
            return Ok(outcome);
        };

        outcome.baseline_locator = Some(baseline.locator.clone());

        if baseline.digest == current.digest {
            debug!("Target {} is byte-identical to its baseline", target.name);
            outcome.total_pixels = DiffOutput::total_pixels(baseline.width, baseline.height);
            return Ok(outcome);
        }

        let baseline_bytes = self.artifacts.get(&baseline.locator).await?;
        let current_bytes = self.artifacts.get(&current.locator).await?;
        let options = self.options.clone();
        let diff = tokio::task::spawn_blocking(move || {
            compare_encoded(&baseline_bytes, &current_bytes, &options)
        })
        .await
        .map_err(|e| SentinelError::Comparison(format!("diff task failed: {}", e)))??;

        let ratio = diff.differing_pixels as f64 / diff.total_pixels as f64;
        outcome.diff_pixels = diff.differing_pixels;
        outcome.total_pixels = diff.total_pixels;
        outcome.similarity = 1.0 - ratio;
        outcome.status = if ratio <= threshold {
            OutcomeStatus::Passed
        } else {
            OutcomeStatus::Failed
        };

        if let Some(mask) = diff.mask_png {
            let locator = self
                .artifacts
                .put(ArtifactKind::Diff, run_id, &target.id, &mask)
                .await?;
            outcome.diff_locator = Some(locator);
        }

        debug!(
            "Target {}: {} of {} pixels differ (threshold {}, {})",
            target.name, outcome.diff_pixels, outcome.total_pixels, threshold, outcome.status
        );
        Ok(outcome)
    }
}
