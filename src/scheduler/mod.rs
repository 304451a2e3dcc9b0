//! Recurring runs.
//!
//! The [`Scheduler`] owns one timer task per registered schedule and
//! guarantees at most one in-flight run per schedule. Two guards back that
//! up: an in-memory "firing" set for this process, and the persisted open
//! `schedule_runs` row for anything a previous process left behind. Open
//! rows older than the staleness window are treated as orphaned.

pub mod recurrence;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SentinelError};
use crate::log_capture::{LogLevel, LogSource, LogState};
use crate::orchestrator::RunOrchestrator;
use crate::store::{Schedule, SentinelDb, TriggerType};
pub use recurrence::Recurrence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// This process is already firing the schedule.
    AlreadyFiring,
    /// A recent unfinished schedule run exists in the store.
    OpenScheduleRun,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FireOutcome {
    Suppressed { reason: SuppressReason },
    Finished {
        schedule_run_id: i64,
        run_id: Option<String>,
        success: bool,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveSchedule {
    pub schedule_id: String,
    pub expression: String,
    pub timezone: String,
    pub next_fire_at: Option<DateTime<Utc>>,
}

struct TimerHandle {
    expression: String,
    timezone: String,
    next_fire: Option<DateTime<Utc>>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    timers: HashMap<String, TimerHandle>,
    firing: HashSet<String>,
}

struct Inner {
    db: Arc<SentinelDb>,
    orchestrator: Arc<RunOrchestrator>,
    logs: Arc<LogState>,
    stale_floor: Duration,
    registry: Mutex<Registry>,
}

/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

/// Releases the schedule's "firing" marker however the fire ends.
struct FiringGuard {
    inner: Arc<Inner>,
    schedule_id: String,
}

impl Drop for FiringGuard {
    fn drop(&mut self) {
        self.inner.registry.lock().firing.remove(&self.schedule_id);
    }
}

impl Scheduler {
    pub fn new(
        db: Arc<SentinelDb>,
        orchestrator: Arc<RunOrchestrator>,
        logs: Arc<LogState>,
        stale_floor: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                orchestrator,
                logs,
                stale_floor,
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Start (or restart) the timer for `schedule`. Returns the next fire
    /// time. An existing timer for the same schedule is stopped first.
    pub fn register(&self, schedule: &Schedule) -> Result<Option<DateTime<Utc>>> {
        let recurrence = Recurrence::parse(&schedule.expression, &schedule.timezone)?;
        let next_fire = recurrence.next_after(Utc::now());

        let task = tokio::spawn(timer_loop(
            Arc::downgrade(&self.inner),
            schedule.id.clone(),
            recurrence,
        ));

        let replaced = {
            let mut registry = self.inner.registry.lock();
            registry.timers.insert(
                schedule.id.clone(),
                TimerHandle {
                    expression: schedule.expression.clone(),
                    timezone: schedule.timezone.clone(),
                    next_fire,
                    task,
                },
            )
        };
        if let Some(old) = replaced {
            old.task.abort();
            debug!("Replaced timer for schedule {}", schedule.id);
        }

        if let Err(e) = self
            .inner
            .db
            .record_schedule_fire_times(&schedule.id, None, next_fire)
        {
            warn!("Failed to persist next fire for schedule {}: {}", schedule.id, e);
        }
        info!(
            "Registered schedule {} ({} {}), next fire {:?}",
            schedule.id, schedule.expression, schedule.timezone, next_fire
        );
        Ok(next_fire)
    }

    /// Stop and forget the timer. Returns whether one existed.
    pub fn unregister(&self, schedule_id: &str) -> bool {
        let removed = self.inner.registry.lock().timers.remove(schedule_id);
        match removed {
            Some(handle) => {
                handle.task.abort();
                info!("Unregistered schedule {}", schedule_id);
                true
            }
            None => false,
        }
    }

    /// Apply an edited schedule: re-register when enabled, drop otherwise.
    pub fn update(&self, schedule: &Schedule) -> Result<()> {
        if schedule.enabled {
            self.register(schedule)?;
        } else {
            self.unregister(&schedule.id);
            self.inner
                .db
                .record_schedule_fire_times(&schedule.id, None, None)?;
        }
        Ok(())
    }

    /// Register every enabled schedule in the store. Invalid ones are
    /// logged and skipped. Nothing is fired here; timers fire at their next
    /// natural tick.
    pub async fn load_enabled(&self) -> Result<usize> {
        let schedules = self.inner.db.list_enabled_schedules()?;
        let mut registered = 0;
        for schedule in &schedules {
            match self.register(schedule) {
                Ok(_) => registered += 1,
                Err(e) => {
                    warn!("Skipping schedule {}: {}", schedule.id, e);
                    self.inner
                        .logs
                        .emit(
                            LogSource::Scheduler,
                            LogLevel::Warn,
                            format!("Schedule {} not loaded: {}", schedule.id, e),
                        )
                        .await;
                }
            }
        }
        info!("Loaded {} of {} enabled schedules", registered, schedules.len());
        Ok(registered)
    }

    pub fn list_active(&self) -> Vec<ActiveSchedule> {
        let registry = self.inner.registry.lock();
        let mut active: Vec<ActiveSchedule> = registry
            .timers
            .iter()
            .map(|(id, handle)| ActiveSchedule {
                schedule_id: id.clone(),
                expression: handle.expression.clone(),
                timezone: handle.timezone.clone(),
                next_fire_at: handle.next_fire,
            })
            .collect();
        active.sort_by(|a, b| a.schedule_id.cmp(&b.schedule_id));
        active
    }

    /// Stop every timer. Runs already in flight finish on their own.
    pub fn shutdown(&self) {
        let timers: Vec<(String, TimerHandle)> =
            self.inner.registry.lock().timers.drain().collect();
        for (_, handle) in &timers {
            handle.task.abort();
        }
        info!("Scheduler stopped ({} timers)", timers.len());
    }

    /// Fire a schedule by hand, subject to the same single-flight guard.
    pub async fn trigger_now(&self, schedule_id: &str) -> Result<FireOutcome> {
        if self.inner.db.get_schedule(schedule_id)?.is_none() {
            return Err(SentinelError::NotFound(format!("schedule {}", schedule_id)));
        }
        self.fire(schedule_id, TriggerType::Manual).await
    }

    /// Run the schedule's group once unless a run for this schedule is
    /// already in flight.
    pub async fn fire(&self, schedule_id: &str, trigger: TriggerType) -> Result<FireOutcome> {
        let _guard = {
            let mut registry = self.inner.registry.lock();
            if !registry.firing.insert(schedule_id.to_string()) {
                debug!("Schedule {} already firing; dropping {} fire", schedule_id, trigger);
                return Ok(FireOutcome::Suppressed {
                    reason: SuppressReason::AlreadyFiring,
                });
            }
            FiringGuard {
                inner: self.inner.clone(),
                schedule_id: schedule_id.to_string(),
            }
        };

        let db = &self.inner.db;
        let schedule = db
            .get_schedule(schedule_id)?
            .ok_or_else(|| SentinelError::NotFound(format!("schedule {}", schedule_id)))?;

        if let Some(open) = db.open_schedule_run(schedule_id)? {
            let window = self.staleness_window(&schedule);
            let age = (Utc::now() - open.started_at).to_std().unwrap_or_default();
            if age < window {
                debug!(
                    "Schedule {} has open run {} ({:?} old); dropping fire",
                    schedule_id, open.id, age
                );
                return Ok(FireOutcome::Suppressed {
                    reason: SuppressReason::OpenScheduleRun,
                });
            }
            warn!(
                "Closing orphaned schedule run {} for schedule {} ({:?} old)",
                open.id, schedule_id, age
            );
            db.complete_schedule_run(
                open.id,
                false,
                Some(&format!("orphaned: still open after {:?}", age)),
            )?;
        }

        let schedule_run_id = db.insert_schedule_run(schedule_id, trigger)?;
        self.inner
            .logs
            .emit(
                LogSource::Scheduler,
                LogLevel::Info,
                format!("Schedule {} fired ({})", schedule_id, trigger),
            )
            .await;

        let (run_id, success, error) = match self.inner.orchestrator.begin_run(&schedule.group_id, trigger) {
            Ok(run) => {
                let linked = db.link_schedule_run(schedule_run_id, &run.id);
                let executed = match linked {
                    Ok(()) => self.inner.orchestrator.execute(&run).await.map(|_| ()),
                    Err(e) => Err(e),
                };
                match executed {
                    Ok(()) => (Some(run.id), true, None),
                    Err(e) => (Some(run.id), false, Some(e.to_string())),
                }
            }
            Err(e) => (None, false, Some(e.to_string())),
        };

        if let Some(e) = &error {
            error!("Schedule {} run failed: {}", schedule_id, e);
            self.inner
                .logs
                .emit(
                    LogSource::Scheduler,
                    LogLevel::Error,
                    format!("Schedule {} run failed: {}", schedule_id, e),
                )
                .await;
        }

        db.complete_schedule_run(schedule_run_id, success, error.as_deref())?;

        let next_fire = Recurrence::parse(&schedule.expression, &schedule.timezone)
            .ok()
            .and_then(|r| r.next_after(Utc::now()));
        db.record_schedule_fire_times(schedule_id, Some(Utc::now()), next_fire)?;

        Ok(FireOutcome::Finished {
            schedule_run_id,
            run_id,
            success,
        })
    }

    /// How long an open schedule run is presumed alive.
    fn staleness_window(&self, schedule: &Schedule) -> Duration {
        let period = Recurrence::parse(&schedule.expression, &schedule.timezone)
            .ok()
            .and_then(|r| r.period(Utc::now()))
            .unwrap_or_default();
        self.inner.stale_floor.max(period)
    }
}

impl Inner {
    fn set_next_fire(&self, schedule_id: &str, next_fire: Option<DateTime<Utc>>) {
        if let Some(handle) = self.registry.lock().timers.get_mut(schedule_id) {
            handle.next_fire = next_fire;
        }
        if let Err(e) = self.db.record_schedule_fire_times(schedule_id, None, next_fire) {
            warn!("Failed to persist next fire for schedule {}: {}", schedule_id, e);
        }
    }
}

/// Sleep until each next fire and hand the fire to its own task, so a
/// long run never delays the timer and survives the timer being replaced.
async fn timer_loop(inner: Weak<Inner>, schedule_id: String, recurrence: Recurrence) {
    let mut cursor = Utc::now();
    loop {
        let Some(next) = recurrence.next_after(cursor) else {
            debug!("Schedule {} has no further fire times", schedule_id);
            break;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::sleep(wait).await;
        cursor = next;

        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.set_next_fire(&schedule_id, recurrence.next_after(next));

        let scheduler = Scheduler { inner };
        let id = schedule_id.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.fire(&id, TriggerType::Scheduled).await {
                error!("Scheduled fire of {} failed: {}", id, e);
            }
        });
    }
}
