use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{ApiResult, MessageResponse};
use crate::error::SentinelError;
use crate::log_capture::{LogLevel, LogSource};
use crate::retention::purge_artifacts;
use crate::state::SharedState;
use crate::store::{validate_threshold, Capture, Group, Schedule, Target, Viewport};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    pub default_threshold: Option<f64>,
    pub default_viewport: Option<Viewport>,
    pub notify_on_failure: Option<bool>,
    pub notify_on_success: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTargetRequest {
    pub name: String,
    pub address: String,
    pub pre_script: Option<String>,
    pub threshold: Option<f64>,
    pub viewport: Option<Viewport>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub targets: Vec<Target>,
    pub schedule: Option<Schedule>,
}

fn require_name(name: &str, what: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SentinelError::Configuration(format!("{} name is required", what)));
    }
    Ok(name.to_string())
}

/// Only absolute http(s) URLs can be captured.
pub fn validate_address(address: &str) -> ApiResult<()> {
    let parsed = url::Url::parse(address).map_err(|e| {
        SentinelError::Configuration(format!("invalid address '{}': {}", address, e))
    })?;
    match parsed.scheme() {
        "http" | "https" if parsed.host().is_some() => Ok(()),
        _ => Err(SentinelError::Configuration(format!(
            "address '{}' must be an http(s) URL",
            address
        ))),
    }
}

// ============================================================================
// Groups
// ============================================================================

/// GET /groups
pub async fn list_groups(State(state): State<SharedState>) -> ApiResult<Json<Vec<Group>>> {
    Ok(Json(state.db.list_groups()?))
}

/// POST /groups
pub async fn create_group(
    State(state): State<SharedState>,
    Json(body): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    let mut group = Group::new(require_name(&body.name, "group")?);
    group.description = body.description;
    if let Some(threshold) = body.default_threshold {
        validate_threshold(threshold)?;
        group.default_threshold = threshold;
    }
    if let Some(viewport) = body.default_viewport {
        viewport.validate()?;
        group.default_viewport = viewport;
    }
    if let Some(flag) = body.notify_on_failure {
        group.notify_on_failure = flag;
    }
    if let Some(flag) = body.notify_on_success {
        group.notify_on_success = flag;
    }

    state.db.insert_group(&group)?;
    state
        .logs
        .emit(
            LogSource::Api,
            LogLevel::Info,
            format!("Group '{}' created", group.name),
        )
        .await;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /groups/{id}
pub async fn get_group(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GroupDetail>> {
    let group = state.db.require_group(&id)?;
    let targets = state.db.list_targets(&id)?;
    let schedule = state.db.schedule_for_group(&id)?;
    Ok(Json(GroupDetail {
        group,
        targets,
        schedule,
    }))
}

/// DELETE /groups/{id}: cascades to targets, captures, runs and schedule.
pub async fn delete_group(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    if let Some(schedule) = state.db.schedule_for_group(&id)? {
        state.scheduler.unregister(&schedule.id);
    }
    let locators = state
        .db
        .delete_group(&id)?
        .ok_or_else(|| SentinelError::NotFound(format!("group {}", id)))?;
    let removed = purge_artifacts(state.artifacts.as_ref(), &locators).await;
    Ok(Json(MessageResponse::ok(format!(
        "Group {} deleted ({} artifacts removed)",
        id, removed
    ))))
}

// ============================================================================
// Targets
// ============================================================================

/// GET /groups/{id}/targets
pub async fn list_targets(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Target>>> {
    state.db.require_group(&id)?;
    Ok(Json(state.db.list_targets(&id)?))
}

/// POST /groups/{id}/targets
pub async fn create_target(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(body): Json<CreateTargetRequest>,
) -> ApiResult<(StatusCode, Json<Target>)> {
    let group = state.db.require_group(&id)?;
    let name = require_name(&body.name, "target")?;
    let address = body.address.trim().to_string();
    validate_address(&address)?;
    if let Some(threshold) = body.threshold {
        validate_threshold(threshold)?;
    }
    if let Some(viewport) = &body.viewport {
        viewport.validate()?;
    }

    let mut target = Target::new(&group.id, name, address);
    target.pre_script = body.pre_script.filter(|s| !s.trim().is_empty());
    target.threshold = body.threshold;
    target.viewport = body.viewport;
    target.active = body.active.unwrap_or(true);
    target.position = state.db.next_target_position(&group.id)?;
    target.updated_at = Utc::now();

    state.db.insert_target(&target)?;
    Ok((StatusCode::CREATED, Json(target)))
}

/// DELETE /targets/{id}
pub async fn delete_target(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let locators = state
        .db
        .delete_target(&id)?
        .ok_or_else(|| SentinelError::NotFound(format!("target {}", id)))?;
    let removed = purge_artifacts(state.artifacts.as_ref(), &locators).await;
    Ok(Json(MessageResponse::ok(format!(
        "Target {} deleted ({} artifacts removed)",
        id, removed
    ))))
}

// ============================================================================
// Baselines
// ============================================================================

/// POST /targets/{id}/baseline: capture now and adopt as baseline.
pub async fn capture_baseline(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Capture>> {
    let capture = state.orchestrator.capture_baseline(&id).await?;
    state
        .logs
        .emit(
            LogSource::Api,
            LogLevel::Info,
            format!("New baseline captured for target {}", id),
        )
        .await;
    Ok(Json(capture))
}

/// POST /captures/{id}/promote
pub async fn promote_capture(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Capture>> {
    Ok(Json(state.orchestrator.promote_capture(&id)?))
}
