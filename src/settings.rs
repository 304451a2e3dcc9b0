use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::SentinelConfig;

/// Delivery channels for run notifications. Which runs notify is decided
/// per group; these settings only say where messages go.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NotificationSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub email: Option<EmailSettings>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailSettings {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub from: String,
    /// Comma-separated recipient list.
    pub to: String,
}

fn default_smtp_port() -> u16 {
    587
}

impl EmailSettings {
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to.split(',').map(str::trim).filter(|s| !s.is_empty())
    }
}

impl NotificationSettings {
    pub fn has_channels(&self) -> bool {
        self.email.is_some() || self.webhook_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

pub fn settings_path(config: &SentinelConfig) -> PathBuf {
    config.data_dir.join("notification-settings.json")
}

pub fn load_settings(path: &Path) -> NotificationSettings {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
        Err(_) => NotificationSettings::default(),
    }
}

pub fn save_settings(path: &Path, settings: &NotificationSettings) {
    match serde_json::to_string_pretty(settings) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("Failed to save notification settings to {:?}: {}", path, e);
            }
        }
        Err(e) => {
            warn!("Failed to serialize notification settings: {}", e);
        }
    }
}
