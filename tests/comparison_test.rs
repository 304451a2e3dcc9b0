mod common;

use visual_sentinel::artifacts::ArtifactStore;
use visual_sentinel::store::{OutcomeStatus, RunReport, Target, ThresholdSource, TriggerType};

use common::{address, dotted, harness, seed_group, white, Harness};

async fn run_once(h: &Harness, group_id: &str) -> RunReport {
    let run = h.orchestrator.begin_run(group_id, TriggerType::Manual).unwrap();
    h.orchestrator.execute(&run).await.unwrap()
}

fn set_threshold(h: &Harness, target: &Target, threshold: f64) {
    h.db.conn()
        .execute(
            "UPDATE targets SET threshold=?2 WHERE id=?1",
            rusqlite::params![target.id, threshold],
        )
        .unwrap();
}

#[tokio::test]
async fn test_first_capture_becomes_baseline() {
    let h = harness();
    let (group, targets) = seed_group(&h.db, 1);

    let report = run_once(&h, &group.id).await;

    let outcome = &report.outcomes[0].outcome;
    assert_eq!(outcome.status, OutcomeStatus::Passed);
    assert_eq!(outcome.similarity, 1.0);
    assert_eq!(h.db.count_baselines(&targets[0].id).unwrap(), 1);

    let baseline = h.db.current_baseline(&targets[0].id).unwrap().unwrap();
    assert_eq!(outcome.baseline_locator.as_deref(), Some(baseline.locator.as_str()));
    assert_eq!(outcome.current_locator.as_deref(), Some(baseline.locator.as_str()));
}

#[tokio::test]
async fn test_second_run_keeps_single_baseline() {
    let h = harness();
    let (group, targets) = seed_group(&h.db, 1);

    run_once(&h, &group.id).await;
    run_once(&h, &group.id).await;

    assert_eq!(h.db.count_baselines(&targets[0].id).unwrap(), 1);
}

#[tokio::test]
async fn test_threshold_boundary_is_inclusive() {
    let h = harness();
    let (group, targets) = seed_group(&h.db, 1);
    let target = &targets[0];

    // White 10x10 baseline, then five changed pixels: a ratio of exactly 0.05.
    h.capture.set_image(&address(0), &white(10, 10));
    run_once(&h, &group.id).await;
    h.capture.set_image(&address(0), &dotted(10, 10, 5));

    set_threshold(&h, target, 0.05);
    let at_threshold = run_once(&h, &group.id).await;
    let outcome = &at_threshold.outcomes[0].outcome;
    assert_eq!(outcome.diff_pixels, 5);
    assert_eq!(outcome.total_pixels, 100);
    assert_eq!(outcome.status, OutcomeStatus::Passed);
    assert_eq!(outcome.threshold_used, 0.05);
    assert_eq!(outcome.threshold_source, ThresholdSource::Target);
    assert!((outcome.similarity - 0.95).abs() < 1e-12);

    set_threshold(&h, target, 0.049);
    let below = run_once(&h, &group.id).await;
    let outcome = &below.outcomes[0].outcome;
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(outcome.diff_locator.is_some());
    assert_eq!(below.run.status, visual_sentinel::store::RunStatus::Failed);
}

#[tokio::test]
async fn test_group_default_threshold_applies() {
    let h = harness();
    let (group, _targets) = seed_group(&h.db, 1);

    run_once(&h, &group.id).await;
    h.capture.set_image(&address(0), &dotted(10, 10, 5));
    let report = run_once(&h, &group.id).await;

    let outcome = &report.outcomes[0].outcome;
    assert_eq!(outcome.threshold_source, ThresholdSource::GroupDefault);
    assert_eq!(outcome.threshold_used, group.default_threshold);
    assert_eq!(outcome.status, OutcomeStatus::Passed);
}

#[tokio::test]
async fn test_size_mismatch_is_resized_not_failed() {
    let h = harness();
    let (group, _targets) = seed_group(&h.db, 1);

    h.capture.set_image(&address(0), &white(10, 10));
    run_once(&h, &group.id).await;
    h.capture.set_image(&address(0), &white(20, 20));
    let report = run_once(&h, &group.id).await;

    let outcome = &report.outcomes[0].outcome;
    assert_eq!(outcome.status, OutcomeStatus::Passed);
    assert_eq!(outcome.diff_pixels, 0);
    assert_eq!(outcome.total_pixels, 100);
    assert!(outcome.diff_locator.is_none());
}

#[tokio::test]
async fn test_identical_capture_skips_pixel_diff() {
    let h = harness();
    let (group, _targets) = seed_group(&h.db, 1);

    run_once(&h, &group.id).await;
    let report = run_once(&h, &group.id).await;

    let outcome = &report.outcomes[0].outcome;
    assert_eq!(outcome.status, OutcomeStatus::Passed);
    assert_eq!(outcome.similarity, 1.0);
    assert_eq!(outcome.diff_pixels, 0);
    assert!(outcome.diff_locator.is_none());
}

#[tokio::test]
async fn test_diff_image_is_stored() {
    let h = harness();
    let (group, _targets) = seed_group(&h.db, 1);

    run_once(&h, &group.id).await;
    h.capture.set_image(&address(0), &dotted(10, 10, 20));
    let report = run_once(&h, &group.id).await;

    let outcome = &report.outcomes[0].outcome;
    assert_eq!(outcome.status, OutcomeStatus::Failed);
    let locator = outcome.diff_locator.as_deref().unwrap();
    assert!(locator.starts_with("diffs/"));

    let bytes = h.artifacts.get(locator).await.unwrap();
    let mask = image::load_from_memory(&bytes).unwrap();
    assert_eq!((mask.width(), mask.height()), (10, 10));
}
