use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::time::Duration;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub capture_ready: bool,
    pub capture_error: Option<String>,
    pub active_schedules: usize,
}

/// GET /health: process liveness plus capture service reachability.
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let probe = tokio::time::timeout(Duration::from_secs(5), state.capture.ready()).await;
    let capture_error = match probe {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("capture service health probe timed out".to_string()),
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        capture_ready: capture_error.is_none(),
        capture_error,
        active_schedules: state.scheduler.list_active().len(),
    })
}
