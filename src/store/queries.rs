use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::db::{outcome_from_row, run_from_row, SentinelDb, OUTCOME_SELECT, RUN_SELECT};
use super::{Outcome, OutcomeStatus, Run};
use crate::error::Result;

/// An outcome joined with the target it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeDetail {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub target_name: String,
    pub target_address: String,
}

/// Everything needed to report on one run: the run, its group's name and
/// its outcomes in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run: Run,
    pub group_name: String,
    pub outcomes: Vec<OutcomeDetail>,
}

impl RunReport {
    /// Outcomes that did not pass (failed or errored).
    pub fn failed_outcomes(&self) -> impl Iterator<Item = &OutcomeDetail> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.status != OutcomeStatus::Passed)
    }
}

pub fn run_report(db: &SentinelDb, run_id: &str) -> Result<Option<RunReport>> {
    let conn = db.conn();

    let run = conn
        .query_row(
            &format!("{} WHERE id=?1", RUN_SELECT),
            params![run_id],
            run_from_row,
        )
        .optional()?;
    let Some(run) = run else {
        return Ok(None);
    };

    let group_name: String = conn.query_row(
        "SELECT name FROM groups WHERE id=?1",
        params![run.group_id],
        |row| row.get(0),
    )?;

    // Column list of OUTCOME_SELECT qualified through a subquery so the
    // shared row mapper can be reused.
    let mut stmt = conn.prepare(&format!(
        "SELECT o.*, t.name, t.address
         FROM ({} WHERE run_id=?1) o
         JOIN targets t ON t.id = o.target_id
         ORDER BY o.id",
        OUTCOME_SELECT
    ))?;
    let rows = stmt.query_map(params![run_id], |row| {
        Ok(OutcomeDetail {
            outcome: outcome_from_row(row)?,
            target_name: row.get(14)?,
            target_address: row.get(15)?,
        })
    })?;
    let outcomes = rows.collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(RunReport {
        run,
        group_name,
        outcomes,
    }))
}

/// Runs of a group, most recent first.
pub fn list_runs(db: &SentinelDb, group_id: &str, limit: usize) -> Result<Vec<Run>> {
    let conn = db.conn();
    let mut stmt = conn.prepare(&format!(
        "{} WHERE group_id=?1 ORDER BY started_at DESC, rowid DESC LIMIT ?2",
        RUN_SELECT
    ))?;
    let rows = stmt.query_map(params![group_id, limit as i64], run_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}
