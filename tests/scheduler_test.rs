mod common;

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

use visual_sentinel::error::SentinelError;
use visual_sentinel::scheduler::{FireOutcome, Scheduler, SuppressReason};
use visual_sentinel::store::queries::list_runs;
use visual_sentinel::store::{Schedule, TriggerType};

use common::{harness, seed_group, Harness};

const YEARLY: &str = "0 0 1 1 *";
const EVERY_MINUTE: &str = "* * * * *";
const EVERY_SECOND: &str = "* * * * * *";

fn scheduler(h: &Harness, stale_floor: Duration) -> Scheduler {
    Scheduler::new(h.db.clone(), h.orchestrator.clone(), h.logs.clone(), stale_floor)
}

fn seed_schedule(h: &Harness, expression: &str) -> Schedule {
    let (group, _targets) = seed_group(&h.db, 2);
    h.db.upsert_schedule(&Schedule::new(&group.id, expression, "UTC"))
        .unwrap()
}

#[tokio::test]
async fn test_concurrent_fires_run_once() {
    let h = harness();
    let schedule = seed_schedule(&h, YEARLY);
    let sched = scheduler(&h, Duration::from_secs(1800));
    h.capture.close_gate();

    let first = {
        let sched = sched.clone();
        let id = schedule.id.clone();
        tokio::spawn(async move { sched.fire(&id, TriggerType::Scheduled).await })
    };
    h.capture.wait_for_calls(1).await;

    let second = sched.fire(&schedule.id, TriggerType::Manual).await.unwrap();
    assert_eq!(
        second,
        FireOutcome::Suppressed {
            reason: SuppressReason::AlreadyFiring
        }
    );

    h.capture.open_gate();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, FireOutcome::Finished { success: true, .. }));

    assert_eq!(list_runs(&h.db, &schedule.group_id, 10).unwrap().len(), 1);
    assert_eq!(h.db.list_schedule_runs(&schedule.id, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_open_run_from_other_process_suppresses() {
    let h = harness();
    let schedule = seed_schedule(&h, YEARLY);
    let ours = scheduler(&h, Duration::from_secs(1800));
    let theirs = scheduler(&h, Duration::from_secs(1800));
    h.capture.close_gate();

    let in_flight = {
        let theirs = theirs.clone();
        let id = schedule.id.clone();
        tokio::spawn(async move { theirs.fire(&id, TriggerType::Scheduled).await })
    };
    h.capture.wait_for_calls(1).await;

    let outcome = ours.fire(&schedule.id, TriggerType::Scheduled).await.unwrap();
    assert_eq!(
        outcome,
        FireOutcome::Suppressed {
            reason: SuppressReason::OpenScheduleRun
        }
    );

    h.capture.open_gate();
    in_flight.await.unwrap().unwrap();
    assert_eq!(h.db.list_schedule_runs(&schedule.id, 10).unwrap().len(), 1);
}

#[tokio::test]
async fn test_stale_open_run_is_taken_over() {
    let h = harness();
    let schedule = seed_schedule(&h, EVERY_MINUTE);
    let sched = scheduler(&h, Duration::from_secs(60));

    let orphan = h
        .db
        .insert_schedule_run(&schedule.id, TriggerType::Scheduled)
        .unwrap();
    h.db.conn()
        .execute(
            "UPDATE schedule_runs SET started_at=?2 WHERE id=?1",
            rusqlite::params![orphan, Utc::now() - ChronoDuration::hours(2)],
        )
        .unwrap();

    let outcome = sched.fire(&schedule.id, TriggerType::Scheduled).await.unwrap();
    let FireOutcome::Finished {
        schedule_run_id,
        run_id,
        success,
    } = outcome
    else {
        panic!("expected the fire to proceed, got {:?}", outcome);
    };
    assert_ne!(schedule_run_id, orphan);
    assert!(run_id.is_some());
    assert!(success);

    let rows = h.db.list_schedule_runs(&schedule.id, 10).unwrap();
    let closed = rows.iter().find(|r| r.id == orphan).unwrap();
    assert_eq!(closed.success, Some(false));
    assert!(closed.completed_at.is_some());
    assert!(closed.error.as_deref().unwrap().contains("orphaned"));
}

#[tokio::test]
async fn test_recent_open_run_within_window_suppresses() {
    let h = harness();
    let schedule = seed_schedule(&h, EVERY_MINUTE);
    let sched = scheduler(&h, Duration::from_secs(60));
    h.db.insert_schedule_run(&schedule.id, TriggerType::Scheduled)
        .unwrap();

    let outcome = sched.fire(&schedule.id, TriggerType::Scheduled).await.unwrap();
    assert_eq!(
        outcome,
        FireOutcome::Suppressed {
            reason: SuppressReason::OpenScheduleRun
        }
    );
    assert!(list_runs(&h.db, &schedule.group_id, 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_fire_records_link_and_fire_times() {
    let h = harness();
    let schedule = seed_schedule(&h, YEARLY);
    let sched = scheduler(&h, Duration::from_secs(1800));

    let outcome = sched.fire(&schedule.id, TriggerType::Scheduled).await.unwrap();
    let FireOutcome::Finished { run_id, .. } = outcome else {
        panic!("unexpected {:?}", outcome);
    };

    let rows = h.db.list_schedule_runs(&schedule.id, 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].run_id, run_id);
    assert_eq!(rows[0].trigger, TriggerType::Scheduled);
    assert_eq!(rows[0].success, Some(true));

    let run = h.db.get_run(run_id.as_deref().unwrap()).unwrap().unwrap();
    assert_eq!(run.trigger, TriggerType::Scheduled);

    let stored = h.db.get_schedule(&schedule.id).unwrap().unwrap();
    assert!(stored.last_fired_at.is_some());
    assert!(stored.next_fire_at.unwrap() > Utc::now());
}

#[tokio::test]
async fn test_failed_pass_marks_schedule_run_unsuccessful() {
    let h = harness();
    let schedule = seed_schedule(&h, YEARLY);
    let sched = scheduler(&h, Duration::from_secs(1800));
    h.capture.set_unreachable(true);

    let outcome = sched.fire(&schedule.id, TriggerType::Scheduled).await.unwrap();
    assert!(matches!(outcome, FireOutcome::Finished { success: false, .. }));

    let rows = h.db.list_schedule_runs(&schedule.id, 10).unwrap();
    assert_eq!(rows[0].success, Some(false));
    assert!(rows[0].error.is_some());
    assert!(h.db.open_schedule_run(&schedule.id).unwrap().is_none());
}

#[tokio::test]
async fn test_reregister_replaces_timer() {
    let h = harness();
    let mut schedule = seed_schedule(&h, EVERY_SECOND);
    let sched = scheduler(&h, Duration::from_secs(1800));

    sched.register(&schedule).unwrap();
    schedule.expression = YEARLY.to_string();
    sched.register(&schedule).unwrap();

    let active = sched.list_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].expression, YEARLY);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(h.capture.calls(), 0);
    assert!(h.db.list_schedule_runs(&schedule.id, 10).unwrap().is_empty());
    sched.shutdown();
}

#[tokio::test]
async fn test_timer_fires_on_schedule() {
    let h = harness();
    let schedule = seed_schedule(&h, EVERY_SECOND);
    let sched = scheduler(&h, Duration::from_secs(1800));

    let next = sched.register(&schedule).unwrap();
    assert!(next.is_some());

    let mut fired = false;
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = h.db.get_schedule(&schedule.id).unwrap().unwrap();
        if stored.last_fired_at.is_some() {
            fired = true;
            break;
        }
    }
    sched.shutdown();

    assert!(fired, "every-second schedule did not fire within 3s");
    assert!(!h.db.list_schedule_runs(&schedule.id, 10).unwrap().is_empty());
    assert!(sched.list_active().is_empty());
}

#[tokio::test]
async fn test_update_disabled_unregisters() {
    let h = harness();
    let mut schedule = seed_schedule(&h, YEARLY);
    let sched = scheduler(&h, Duration::from_secs(1800));

    sched.update(&schedule).unwrap();
    assert_eq!(sched.list_active().len(), 1);
    assert!(h.db.get_schedule(&schedule.id).unwrap().unwrap().next_fire_at.is_some());

    schedule.enabled = false;
    sched.update(&schedule).unwrap();
    assert!(sched.list_active().is_empty());
    assert!(h.db.get_schedule(&schedule.id).unwrap().unwrap().next_fire_at.is_none());
    assert!(!sched.unregister(&schedule.id));
}

#[tokio::test]
async fn test_load_enabled_skips_invalid() {
    let h = harness();
    let good = seed_schedule(&h, YEARLY);
    let (other_group, _) = seed_group(&h.db, 1);
    h.db.upsert_schedule(&Schedule::new(&other_group.id, "not a cron", "UTC"))
        .unwrap();
    let (third_group, _) = seed_group(&h.db, 1);
    let mut disabled = Schedule::new(&third_group.id, YEARLY, "UTC");
    disabled.enabled = false;
    h.db.upsert_schedule(&disabled).unwrap();

    let sched = scheduler(&h, Duration::from_secs(1800));
    assert_eq!(sched.load_enabled().await.unwrap(), 1);

    let active = sched.list_active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].schedule_id, good.id);
    sched.shutdown();
}

#[tokio::test]
async fn test_trigger_unknown_schedule() {
    let h = harness();
    let sched = scheduler(&h, Duration::from_secs(1800));
    let err = sched.trigger_now("nope").await.unwrap_err();
    assert!(matches!(err, SentinelError::NotFound(_)));
}
