use axum::extract::State;
use axum::Json;

use super::{ApiResult, MessageResponse};
use crate::log_capture::{LogLevel, LogSource};
use crate::settings::{save_settings, NotificationSettings};
use crate::state::SharedState;

/// Stands in for the stored SMTP password in responses. Sending it back
/// unchanged keeps the stored password.
pub const PASSWORD_MASK: &str = "********";

fn masked(mut settings: NotificationSettings) -> NotificationSettings {
    if let Some(email) = settings.email.as_mut() {
        if email.password.is_some() {
            email.password = Some(PASSWORD_MASK.to_string());
        }
    }
    settings
}

/// GET /settings/notifications
pub async fn get_notifications(State(state): State<SharedState>) -> Json<NotificationSettings> {
    Json(masked(state.settings.read().await.clone()))
}

/// PUT /settings/notifications
pub async fn put_notifications(
    State(state): State<SharedState>,
    Json(mut body): Json<NotificationSettings>,
) -> ApiResult<Json<NotificationSettings>> {
    if let Some(url) = body.webhook_url.as_deref().filter(|u| !u.is_empty()) {
        super::groups::validate_address(url)?;
    }

    let mut current = state.settings.write().await;
    if let Some(email) = body.email.as_mut() {
        if email.password.as_deref() == Some(PASSWORD_MASK) {
            email.password = current.email.as_ref().and_then(|e| e.password.clone());
        }
    }
    *current = body.clone();
    drop(current);

    save_settings(&state.settings_path, &body);
    state
        .logs
        .emit(LogSource::Api, LogLevel::Info, "Notification settings updated")
        .await;
    Ok(Json(masked(body)))
}

/// POST /settings/notifications/test
pub async fn test_notifications(State(state): State<SharedState>) -> ApiResult<Json<MessageResponse>> {
    state.notifier.send_test().await?;
    Ok(Json(MessageResponse::ok("Test notification sent")))
}
