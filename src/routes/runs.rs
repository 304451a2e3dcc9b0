use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{ApiResult, LimitQuery};
use crate::error::SentinelError;
use crate::log_capture::{LogLevel, LogSource};
use crate::state::SharedState;
use crate::store::queries::{list_runs as query_runs, run_report};
use crate::store::{Run, RunReport};

#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub run_id: String,
}

/// POST /groups/{id}/runs: manual trigger; the run executes in the
/// background.
pub async fn start_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<StartRunResponse>)> {
    let run_id = state.orchestrator.start_run(&id).await?;
    state
        .logs
        .emit(
            LogSource::Api,
            LogLevel::Info,
            format!("Manual run {} queued for group {}", run_id, id),
        )
        .await;
    Ok((StatusCode::ACCEPTED, Json(StartRunResponse { run_id })))
}

/// GET /groups/{id}/runs
pub async fn list_runs(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Run>>> {
    state.db.require_group(&id)?;
    Ok(Json(query_runs(&state.db, &id, query.limit)?))
}

/// GET /runs/{id}
pub async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RunReport>> {
    run_report(&state.db, &id)?
        .map(Json)
        .ok_or_else(|| SentinelError::NotFound(format!("run {}", id)))
}
