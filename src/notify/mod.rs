//! Run notifications.
//!
//! Whether a finished run notifies at all is the group's
//! [`NotificationPolicy`](crate::store::NotificationPolicy). Where the
//! message goes (email, webhook) is the process-wide
//! [`NotificationSettings`].

pub mod email;
pub mod webhook;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, SentinelError};
use crate::settings::NotificationSettings;
use crate::store::RunReport;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &RunReport) -> Result<()>;
}

/// Delivers to every configured channel.
pub struct NotificationDispatcher {
    client: reqwest::Client,
    settings: Arc<RwLock<NotificationSettings>>,
}

impl NotificationDispatcher {
    pub fn new(client: reqwest::Client, settings: Arc<RwLock<NotificationSettings>>) -> Self {
        Self { client, settings }
    }

    /// Send a test message on every configured channel, ignoring the
    /// master switch.
    pub async fn send_test(&self) -> Result<()> {
        let settings = self.settings.read().await.clone();
        if !settings.has_channels() {
            return Err(SentinelError::Configuration(
                "no notification channel configured".to_string(),
            ));
        }

        let mut first_error = None;
        if let Some(url) = settings.webhook_url.as_deref().filter(|u| !u.is_empty()) {
            if let Err(e) = webhook::post(&self.client, url, &webhook::test_payload()).await {
                warn!("Test webhook failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        if let Some(email_settings) = &settings.email {
            let sent = match email::test_message(email_settings) {
                Ok(message) => email::send(email_settings, message).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                warn!("Test email failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn notify(&self, report: &RunReport) -> Result<()> {
        let settings = self.settings.read().await.clone();
        if !settings.enabled {
            debug!("Notifications disabled; skipping run {}", report.run.id);
            return Ok(());
        }

        let mut first_error = None;

        if let Some(url) = settings.webhook_url.as_deref().filter(|u| !u.is_empty()) {
            let payload = webhook::run_payload(report);
            if let Err(e) = webhook::post(&self.client, url, &payload).await {
                warn!("Webhook notification for run {} failed: {}", report.run.id, e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(email_settings) = &settings.email {
            let sent = match email::run_message(email_settings, report) {
                Ok(message) => email::send(email_settings, message).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                warn!("Email notification for run {} failed: {}", report.run.id, e);
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Percentage with two decimals, as shown in messages.
pub(crate) fn percent(similarity: f64) -> String {
    format!("{:.2}%", similarity * 100.0)
}
