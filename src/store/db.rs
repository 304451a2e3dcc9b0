use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use super::{
    Capture, Group, Outcome, Run, RunStatus, RunSummary, Schedule, ScheduleRun, Target,
    TriggerType,
};
use crate::error::{Result, SentinelError};

pub struct SentinelDb {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl SentinelDb {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: Some(path.to_path_buf()),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
            db_path: None,
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                default_threshold REAL NOT NULL,
                default_viewport TEXT NOT NULL,
                notify_on_failure INTEGER NOT NULL DEFAULT 1,
                notify_on_success INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS targets (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                address TEXT NOT NULL,
                pre_script TEXT,
                threshold REAL,
                viewport TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                position INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS captures (
                id TEXT PRIMARY KEY,
                target_id TEXT NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
                locator TEXT NOT NULL,
                is_baseline INTEGER NOT NULL DEFAULT 0,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                digest TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                trigger_type TEXT NOT NULL,
                summary TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                target_id TEXT NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                similarity REAL NOT NULL,
                diff_pixels INTEGER NOT NULL,
                total_pixels INTEGER NOT NULL,
                threshold_used REAL NOT NULL,
                threshold_source TEXT NOT NULL,
                baseline_locator TEXT,
                current_locator TEXT,
                diff_locator TEXT,
                error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL UNIQUE REFERENCES groups(id) ON DELETE CASCADE,
                expression TEXT NOT NULL,
                timezone TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                last_fired_at TEXT,
                next_fire_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schedule_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                schedule_id TEXT NOT NULL REFERENCES schedules(id) ON DELETE CASCADE,
                trigger_type TEXT NOT NULL,
                run_id TEXT REFERENCES runs(id) ON DELETE SET NULL,
                success INTEGER,
                error TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_captures_one_baseline
                ON captures(target_id) WHERE is_baseline = 1;
            CREATE INDEX IF NOT EXISTS idx_targets_group ON targets(group_id, position);
            CREATE INDEX IF NOT EXISTS idx_captures_created ON captures(created_at);
            CREATE INDEX IF NOT EXISTS idx_runs_group_started ON runs(group_id, started_at);
            CREATE INDEX IF NOT EXISTS idx_outcomes_run ON outcomes(run_id);
            CREATE INDEX IF NOT EXISTS idx_schedule_runs_open
                ON schedule_runs(schedule_id) WHERE completed_at IS NULL;
        ",
        )?;
        Ok(())
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub fn insert_group(&self, group: &Group) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO groups (id, name, description, default_threshold, default_viewport,
                notify_on_failure, notify_on_success, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                group.id,
                group.name,
                group.description,
                group.default_threshold,
                serde_json::to_string(&group.default_viewport)?,
                group.notify_on_failure,
                group.notify_on_success,
                group.created_at,
                group.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_group(&self, id: &str) -> Result<Option<Group>> {
        let conn = self.conn();
        let group = conn
            .query_row(
                &format!("{} WHERE id=?1", GROUP_SELECT),
                params![id],
                group_from_row,
            )
            .optional()?;
        Ok(group)
    }

    /// Like [`get_group`](Self::get_group) but a missing group is an error.
    pub fn require_group(&self, id: &str) -> Result<Group> {
        self.get_group(id)?
            .ok_or_else(|| SentinelError::NotFound(format!("group {}", id)))
    }

    pub fn list_groups(&self) -> Result<Vec<Group>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} ORDER BY created_at", GROUP_SELECT))?;
        let rows = stmt.query_map([], group_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Deletes the group with its targets, captures, runs and schedule.
    /// Returns the artifact locators the deleted rows referenced, or `None`
    /// when there was no such group.
    pub fn delete_group(&self, id: &str) -> Result<Option<Vec<String>>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut locators = collect_locators(
            &tx,
            "SELECT c.locator FROM captures c JOIN targets t ON t.id = c.target_id
             WHERE t.group_id=?1",
            id,
        )?;
        locators.extend(collect_locators(
            &tx,
            "SELECT o.diff_locator FROM outcomes o JOIN runs r ON r.id = o.run_id
             WHERE r.group_id=?1 AND o.diff_locator IS NOT NULL",
            id,
        )?);

        let deleted = tx.execute("DELETE FROM groups WHERE id=?1", params![id])?;
        tx.commit()?;
        Ok((deleted > 0).then_some(locators))
    }

    // ========================================================================
    // Targets
    // ========================================================================

    pub fn insert_target(&self, target: &Target) -> Result<()> {
        let conn = self.conn();
        let viewport = target
            .viewport
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "INSERT INTO targets (id, group_id, name, address, pre_script, threshold, viewport,
                active, position, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                target.id,
                target.group_id,
                target.name,
                target.address,
                target.pre_script,
                target.threshold,
                viewport,
                target.active,
                target.position,
                target.created_at,
                target.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_target(&self, id: &str) -> Result<Option<Target>> {
        let conn = self.conn();
        let target = conn
            .query_row(
                &format!("{} WHERE id=?1", TARGET_SELECT),
                params![id],
                target_from_row,
            )
            .optional()?;
        Ok(target)
    }

    /// All targets of a group in iteration order.
    pub fn list_targets(&self, group_id: &str) -> Result<Vec<Target>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE group_id=?1 ORDER BY position, created_at, rowid",
            TARGET_SELECT
        ))?;
        let rows = stmt.query_map(params![group_id], target_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn list_active_targets(&self, group_id: &str) -> Result<Vec<Target>> {
        Ok(self
            .list_targets(group_id)?
            .into_iter()
            .filter(|t| t.active)
            .collect())
    }

    pub fn next_target_position(&self, group_id: &str) -> Result<i64> {
        let conn = self.conn();
        let next = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM targets WHERE group_id=?1",
            params![group_id],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    /// Same contract as [`SentinelDb::delete_group`], for one target.
    pub fn delete_target(&self, id: &str) -> Result<Option<Vec<String>>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut locators =
            collect_locators(&tx, "SELECT locator FROM captures WHERE target_id=?1", id)?;
        locators.extend(collect_locators(
            &tx,
            "SELECT diff_locator FROM outcomes WHERE target_id=?1 AND diff_locator IS NOT NULL",
            id,
        )?);

        let deleted = tx.execute("DELETE FROM targets WHERE id=?1", params![id])?;
        tx.commit()?;
        Ok((deleted > 0).then_some(locators))
    }

    // ========================================================================
    // Captures and baselines
    // ========================================================================

    pub fn insert_capture(&self, capture: &Capture) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO captures (id, target_id, locator, is_baseline, width, height, digest, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                capture.id,
                capture.target_id,
                capture.locator,
                capture.is_baseline,
                capture.width,
                capture.height,
                capture.digest,
                capture.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_capture(&self, id: &str) -> Result<Option<Capture>> {
        let conn = self.conn();
        let capture = conn
            .query_row(
                &format!("{} WHERE id=?1", CAPTURE_SELECT),
                params![id],
                capture_from_row,
            )
            .optional()?;
        Ok(capture)
    }

    pub fn current_baseline(&self, target_id: &str) -> Result<Option<Capture>> {
        let conn = self.conn();
        let capture = conn
            .query_row(
                &format!("{} WHERE target_id=?1 AND is_baseline=1", CAPTURE_SELECT),
                params![target_id],
                capture_from_row,
            )
            .optional()?;
        Ok(capture)
    }

    /// Make `capture_id` the only baseline of its target. The previous
    /// holder is cleared in the same transaction.
    pub fn adopt_baseline(&self, capture_id: &str) -> Result<Capture> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let target_id: String = tx
            .query_row(
                "SELECT target_id FROM captures WHERE id=?1",
                params![capture_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| SentinelError::NotFound(format!("capture {}", capture_id)))?;

        tx.execute(
            "UPDATE captures SET is_baseline=0 WHERE target_id=?1 AND is_baseline=1 AND id != ?2",
            params![target_id, capture_id],
        )?;
        tx.execute(
            "UPDATE captures SET is_baseline=1 WHERE id=?1",
            params![capture_id],
        )?;
        let adopted = tx.query_row(
            &format!("{} WHERE id=?1", CAPTURE_SELECT),
            params![capture_id],
            capture_from_row,
        )?;

        tx.commit()?;
        Ok(adopted)
    }

    pub fn count_baselines(&self, target_id: &str) -> Result<u64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM captures WHERE target_id=?1 AND is_baseline=1",
            params![target_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ========================================================================
    // Runs
    // ========================================================================

    pub fn insert_run(&self, run: &Run) -> Result<()> {
        let conn = self.conn();
        let summary = run.summary.as_ref().map(serde_json::to_string).transpose()?;
        conn.execute(
            "INSERT INTO runs (id, group_id, status, trigger_type, summary, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.id,
                run.group_id,
                run.status,
                run.trigger,
                summary,
                run.started_at,
                run.completed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> Result<Option<Run>> {
        let conn = self.conn();
        let run = conn
            .query_row(
                &format!("{} WHERE id=?1", RUN_SELECT),
                params![id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    /// `pending → running`. Returns false if the run was not pending.
    pub fn mark_running(&self, run_id: &str) -> Result<bool> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE runs SET status='running' WHERE id=?1 AND status='pending'",
            params![run_id],
        )?;
        Ok(updated > 0)
    }

    /// Move a live run to a terminal status. A run that already reached a
    /// terminal status is left untouched and `false` is returned.
    pub fn finish_run(&self, run_id: &str, status: RunStatus, summary: &RunSummary) -> Result<bool> {
        if !status.is_terminal() {
            return Err(SentinelError::RunFailure(format!(
                "cannot finish run {} with non-terminal status {}",
                run_id, status
            )));
        }
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE runs SET status=?2, summary=?3, completed_at=?4
             WHERE id=?1 AND status IN ('pending', 'running')",
            params![run_id, status, serde_json::to_string(summary)?, Utc::now()],
        )?;
        Ok(updated > 0)
    }

    // ========================================================================
    // Outcomes
    // ========================================================================

    pub fn insert_outcome(&self, outcome: &Outcome) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO outcomes (run_id, target_id, status, similarity, diff_pixels, total_pixels,
                threshold_used, threshold_source, baseline_locator, current_locator, diff_locator,
                error, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                outcome.run_id,
                outcome.target_id,
                outcome.status,
                outcome.similarity,
                outcome.diff_pixels as i64,
                outcome.total_pixels as i64,
                outcome.threshold_used,
                outcome.threshold_source,
                outcome.baseline_locator,
                outcome.current_locator,
                outcome.diff_locator,
                outcome.error,
                outcome.created_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Outcomes of a run in insertion order.
    pub fn outcomes_for_run(&self, run_id: &str) -> Result<Vec<Outcome>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} WHERE run_id=?1 ORDER BY id", OUTCOME_SELECT))?;
        let rows = stmt.query_map(params![run_id], outcome_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ========================================================================
    // Schedules
    // ========================================================================

    /// Insert the group's schedule, or update expression, timezone and
    /// enabled flag of the existing one. Returns the stored row.
    pub fn upsert_schedule(&self, schedule: &Schedule) -> Result<Schedule> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO schedules (id, group_id, expression, timezone, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(group_id) DO UPDATE SET
                expression=excluded.expression,
                timezone=excluded.timezone,
                enabled=excluded.enabled,
                updated_at=excluded.updated_at",
            params![
                schedule.id,
                schedule.group_id,
                schedule.expression,
                schedule.timezone,
                schedule.enabled,
                schedule.created_at,
                schedule.updated_at,
            ],
        )?;
        let stored = conn.query_row(
            &format!("{} WHERE group_id=?1", SCHEDULE_SELECT),
            params![schedule.group_id],
            schedule_from_row,
        )?;
        Ok(stored)
    }

    pub fn get_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        let conn = self.conn();
        let schedule = conn
            .query_row(
                &format!("{} WHERE id=?1", SCHEDULE_SELECT),
                params![id],
                schedule_from_row,
            )
            .optional()?;
        Ok(schedule)
    }

    pub fn schedule_for_group(&self, group_id: &str) -> Result<Option<Schedule>> {
        let conn = self.conn();
        let schedule = conn
            .query_row(
                &format!("{} WHERE group_id=?1", SCHEDULE_SELECT),
                params![group_id],
                schedule_from_row,
            )
            .optional()?;
        Ok(schedule)
    }

    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} ORDER BY created_at", SCHEDULE_SELECT))?;
        let rows = stmt.query_map([], schedule_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn list_enabled_schedules(&self) -> Result<Vec<Schedule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE enabled=1 ORDER BY created_at",
            SCHEDULE_SELECT
        ))?;
        let rows = stmt.query_map([], schedule_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn delete_schedule(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute("DELETE FROM schedules WHERE id=?1", params![id])?;
        Ok(deleted > 0)
    }

    /// `last_fired_at` is only overwritten when given.
    pub fn record_schedule_fire_times(
        &self,
        id: &str,
        last_fired_at: Option<DateTime<Utc>>,
        next_fire_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE schedules SET last_fired_at=COALESCE(?2, last_fired_at), next_fire_at=?3
             WHERE id=?1",
            params![id, last_fired_at, next_fire_at],
        )?;
        Ok(())
    }

    // ========================================================================
    // Schedule runs
    // ========================================================================

    pub fn insert_schedule_run(&self, schedule_id: &str, trigger: TriggerType) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO schedule_runs (schedule_id, trigger_type, started_at) VALUES (?1, ?2, ?3)",
            params![schedule_id, trigger, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn link_schedule_run(&self, id: i64, run_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE schedule_runs SET run_id=?2 WHERE id=?1",
            params![id, run_id],
        )?;
        Ok(())
    }

    /// Close an open schedule run. Already-closed rows are not rewritten.
    pub fn complete_schedule_run(&self, id: i64, success: bool, error: Option<&str>) -> Result<bool> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE schedule_runs SET success=?2, error=?3, completed_at=?4
             WHERE id=?1 AND completed_at IS NULL",
            params![id, success, error, Utc::now()],
        )?;
        Ok(updated > 0)
    }

    /// Most recent schedule run without a completion timestamp.
    pub fn open_schedule_run(&self, schedule_id: &str) -> Result<Option<ScheduleRun>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!(
                    "{} WHERE schedule_id=?1 AND completed_at IS NULL ORDER BY started_at DESC, id DESC LIMIT 1",
                    SCHEDULE_RUN_SELECT
                ),
                params![schedule_id],
                schedule_run_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_schedule_runs(&self, schedule_id: &str, limit: usize) -> Result<Vec<ScheduleRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE schedule_id=?1 ORDER BY id DESC LIMIT ?2",
            SCHEDULE_RUN_SELECT
        ))?;
        let rows = stmt.query_map(params![schedule_id, limit as i64], schedule_run_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    // ========================================================================
    // Retention
    // ========================================================================

    /// Non-baseline captures created before `cutoff`.
    pub fn stale_captures(&self, cutoff: DateTime<Utc>) -> Result<Vec<Capture>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE is_baseline=0 AND created_at < ?1 ORDER BY created_at",
            CAPTURE_SELECT
        ))?;
        let rows = stmt.query_map(params![cutoff], capture_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Refuses to delete a baseline.
    pub fn delete_capture(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM captures WHERE id=?1 AND is_baseline=0",
            params![id],
        )?;
        Ok(deleted > 0)
    }

    /// `(outcome id, diff locator)` for diffs recorded before `cutoff`.
    pub fn stale_diff_locators(&self, cutoff: DateTime<Utc>) -> Result<Vec<(i64, String)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, diff_locator FROM outcomes
             WHERE diff_locator IS NOT NULL AND created_at < ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn clear_diff_locator(&self, outcome_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE outcomes SET diff_locator=NULL WHERE id=?1",
            params![outcome_id],
        )?;
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn collect_locators(conn: &Connection, sql: &str, owner: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![owner], |row| row.get(0))?;
    rows.collect::<rusqlite::Result<Vec<String>>>().map_err(Into::into)
}

const GROUP_SELECT: &str = "SELECT id, name, description, default_threshold, default_viewport,
        notify_on_failure, notify_on_success, created_at, updated_at FROM groups";

const TARGET_SELECT: &str = "SELECT id, group_id, name, address, pre_script, threshold, viewport,
        active, position, created_at, updated_at FROM targets";

const CAPTURE_SELECT: &str =
    "SELECT id, target_id, locator, is_baseline, width, height, digest, created_at FROM captures";

pub(super) const RUN_SELECT: &str =
    "SELECT id, group_id, status, trigger_type, summary, started_at, completed_at FROM runs";

pub(super) const OUTCOME_SELECT: &str = "SELECT id, run_id, target_id, status, similarity, diff_pixels, total_pixels,
        threshold_used, threshold_source, baseline_locator, current_locator, diff_locator,
        error, created_at FROM outcomes";

const SCHEDULE_SELECT: &str = "SELECT id, group_id, expression, timezone, enabled, last_fired_at,
        next_fire_at, created_at, updated_at FROM schedules";

const SCHEDULE_RUN_SELECT: &str = "SELECT id, schedule_id, trigger_type, run_id, success, error,
        started_at, completed_at FROM schedule_runs";

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_json_column<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        default_threshold: row.get(3)?,
        default_viewport: json_column(row, 4)?,
        notify_on_failure: row.get(5)?,
        notify_on_success: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<Target> {
    Ok(Target {
        id: row.get(0)?,
        group_id: row.get(1)?,
        name: row.get(2)?,
        address: row.get(3)?,
        pre_script: row.get(4)?,
        threshold: row.get(5)?,
        viewport: optional_json_column(row, 6)?,
        active: row.get(7)?,
        position: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn capture_from_row(row: &Row<'_>) -> rusqlite::Result<Capture> {
    Ok(Capture {
        id: row.get(0)?,
        target_id: row.get(1)?,
        locator: row.get(2)?,
        is_baseline: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        digest: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub(super) fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        group_id: row.get(1)?,
        status: row.get(2)?,
        trigger: row.get(3)?,
        summary: optional_json_column(row, 4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
    })
}

pub(super) fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<Outcome> {
    Ok(Outcome {
        id: row.get(0)?,
        run_id: row.get(1)?,
        target_id: row.get(2)?,
        status: row.get(3)?,
        similarity: row.get(4)?,
        diff_pixels: row.get::<_, i64>(5)? as u64,
        total_pixels: row.get::<_, i64>(6)? as u64,
        threshold_used: row.get(7)?,
        threshold_source: row.get(8)?,
        baseline_locator: row.get(9)?,
        current_locator: row.get(10)?,
        diff_locator: row.get(11)?,
        error: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get(0)?,
        group_id: row.get(1)?,
        expression: row.get(2)?,
        timezone: row.get(3)?,
        enabled: row.get(4)?,
        last_fired_at: row.get(5)?,
        next_fire_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn schedule_run_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduleRun> {
    Ok(ScheduleRun {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        trigger: row.get(2)?,
        run_id: row.get(3)?,
        success: row.get(4)?,
        error: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
    })
}
