use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use super::{ApiResult, LimitQuery, MessageResponse};
use crate::config::DEFAULT_TIMEZONE;
use crate::error::SentinelError;
use crate::log_capture::{LogLevel, LogSource};
use crate::scheduler::{ActiveSchedule, FireOutcome, Recurrence};
use crate::state::SharedState;
use crate::store::{Schedule, ScheduleRun};

#[derive(Debug, Deserialize)]
pub struct PutScheduleRequest {
    pub expression: String,
    pub timezone: Option<String>,
    pub enabled: Option<bool>,
}

/// GET /schedules/active
pub async fn list_active(State(state): State<SharedState>) -> Json<Vec<ActiveSchedule>> {
    Json(state.scheduler.list_active())
}

/// PUT /groups/{id}/schedule: create or replace the group's schedule.
pub async fn put_schedule(
    State(state): State<SharedState>,
    Path(group_id): Path<String>,
    Json(body): Json<PutScheduleRequest>,
) -> ApiResult<Json<Schedule>> {
    state.db.require_group(&group_id)?;
    let timezone = body
        .timezone
        .filter(|tz| !tz.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    // Reject bad input before anything is stored.
    Recurrence::parse(&body.expression, &timezone)?;

    let mut schedule = Schedule::new(&group_id, body.expression.trim(), timezone);
    schedule.enabled = body.enabled.unwrap_or(true);
    schedule.updated_at = Utc::now();

    let stored = state.db.upsert_schedule(&schedule)?;
    state.scheduler.update(&stored)?;
    info!("Schedule for group {} set to '{}'", group_id, stored.expression);

    let refreshed = state
        .db
        .get_schedule(&stored.id)?
        .ok_or_else(|| SentinelError::NotFound(format!("schedule {}", stored.id)))?;
    Ok(Json(refreshed))
}

/// DELETE /schedules/{id}
pub async fn delete_schedule(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.scheduler.unregister(&id);
    if !state.db.delete_schedule(&id)? {
        return Err(SentinelError::NotFound(format!("schedule {}", id)));
    }
    Ok(Json(MessageResponse::ok(format!("Schedule {} deleted", id))))
}

/// POST /schedules/{id}/trigger: fire now in the background.
pub async fn trigger(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    if state.db.get_schedule(&id)?.is_none() {
        return Err(SentinelError::NotFound(format!("schedule {}", id)));
    }

    let scheduler = state.scheduler.clone();
    let logs = state.logs.clone();
    let schedule_id = id.clone();
    tokio::spawn(async move {
        match scheduler.trigger_now(&schedule_id).await {
            Ok(FireOutcome::Suppressed { reason }) => {
                logs.emit(
                    LogSource::Scheduler,
                    LogLevel::Info,
                    format!("Manual trigger of {} suppressed ({:?})", schedule_id, reason),
                )
                .await;
            }
            Ok(FireOutcome::Finished { .. }) => {}
            Err(e) => error!("Manual trigger of schedule {} failed: {}", schedule_id, e),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::ok(format!("Schedule {} triggered", id))),
    ))
}

/// GET /schedules/{id}/runs: most recent first.
pub async fn list_schedule_runs(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<ScheduleRun>>> {
    if state.db.get_schedule(&id)?.is_none() {
        return Err(SentinelError::NotFound(format!("schedule {}", id)));
    }
    Ok(Json(state.db.list_schedule_runs(&id, query.limit)?))
}
