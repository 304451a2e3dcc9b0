pub mod db;
pub mod queries;

pub use db::SentinelDb;
pub use queries::{OutcomeDetail, RunReport};

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{
    DEFAULT_DEVICE_SCALE_FACTOR, DEFAULT_THRESHOLD, DEFAULT_VIEWPORT_HEIGHT,
    DEFAULT_VIEWPORT_WIDTH,
};
use crate::error::{Result, SentinelError};

// ============================================================================
// Shared data model structs
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_scale")]
    pub device_scale_factor: f64,
}

fn default_scale() -> f64 {
    DEFAULT_DEVICE_SCALE_FACTOR
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIEWPORT_WIDTH,
            height: DEFAULT_VIEWPORT_HEIGHT,
            device_scale_factor: DEFAULT_DEVICE_SCALE_FACTOR,
        }
    }
}

impl Viewport {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SentinelError::Configuration(format!(
                "viewport must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.device_scale_factor.is_finite() && self.device_scale_factor > 0.0) {
            return Err(SentinelError::Configuration(format!(
                "device scale factor must be positive, got {}",
                self.device_scale_factor
            )));
        }
        Ok(())
    }
}

/// Reject anything that is not a finite fraction in `[0, 1]`.
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(SentinelError::Configuration(format!(
            "threshold must be a fraction in [0, 1], got {}",
            threshold
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub default_threshold: f64,
    pub default_viewport: Viewport,
    pub notify_on_failure: bool,
    pub notify_on_success: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            default_threshold: DEFAULT_THRESHOLD,
            default_viewport: Viewport::default(),
            notify_on_failure: true,
            notify_on_success: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn notification_policy(&self) -> NotificationPolicy {
        NotificationPolicy {
            notify_on_failure: self.notify_on_failure,
            notify_on_success: self.notify_on_success,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub address: String,
    pub pre_script: Option<String>,
    pub threshold: Option<f64>,
    /// `None` falls back to the group's default viewport.
    pub viewport: Option<Viewport>,
    pub active: bool,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Target {
    pub fn new(group_id: impl Into<String>, name: impl Into<String>, address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: group_id.into(),
            name: name.into(),
            address: address.into(),
            pre_script: None,
            threshold: None,
            viewport: None,
            active: true,
            position: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Threshold to apply and where it came from.
    pub fn resolve_threshold(&self, group_default: f64) -> (f64, ThresholdSource) {
        match self.threshold {
            Some(t) => (t, ThresholdSource::Target),
            None => (group_default, ThresholdSource::GroupDefault),
        }
    }

    pub fn resolve_viewport(&self, group: &Group) -> Viewport {
        self.viewport
            .clone()
            .unwrap_or_else(|| group.default_viewport.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capture {
    pub id: String,
    pub target_id: String,
    pub locator: String,
    pub is_baseline: bool,
    pub width: u32,
    pub height: u32,
    /// Hex SHA-256 of the encoded image bytes.
    pub digest: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub group_id: String,
    pub status: RunStatus,
    pub trigger: TriggerType,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
}

impl Run {
    pub fn new(group_id: impl Into<String>, status: RunStatus, trigger: TriggerType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: group_id.into(),
            status,
            trigger,
            started_at: Utc::now(),
            completed_at: None,
            summary: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub errors: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn tally(outcomes: &[Outcome]) -> Self {
        let mut summary = RunSummary::default();
        for outcome in outcomes {
            summary.total += 1;
            match outcome.status {
                OutcomeStatus::Passed => summary.passed += 1,
                OutcomeStatus::Failed => summary.failed += 1,
                OutcomeStatus::Error => summary.errors += 1,
            }
        }
        summary
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Error outranks failed, failed outranks completed.
    pub fn terminal_status(&self) -> RunStatus {
        if self.errors > 0 {
            RunStatus::Error
        } else if self.failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub id: i64,
    pub run_id: String,
    pub target_id: String,
    pub status: OutcomeStatus,
    pub similarity: f64,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub threshold_used: f64,
    pub threshold_source: ThresholdSource,
    pub baseline_locator: Option<String>,
    pub current_locator: Option<String>,
    pub diff_locator: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Outcome {
    /// Contained per-target failure: no artifacts, zero similarity.
    pub fn errored(
        run_id: &str,
        target_id: &str,
        threshold: f64,
        source: ThresholdSource,
        error: &SentinelError,
    ) -> Self {
        Self {
            id: 0,
            run_id: run_id.to_string(),
            target_id: target_id.to_string(),
            status: OutcomeStatus::Error,
            similarity: 0.0,
            diff_pixels: 0,
            total_pixels: 0,
            threshold_used: threshold,
            threshold_source: source,
            baseline_locator: None,
            current_locator: None,
            diff_locator: None,
            error: Some(error.to_string()),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub group_id: String,
    pub expression: String,
    pub timezone: String,
    pub enabled: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(group_id: impl Into<String>, expression: impl Into<String>, timezone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: group_id.into(),
            expression: expression.into(),
            timezone: timezone.into(),
            enabled: true,
            last_fired_at: None,
            next_fire_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRun {
    pub id: i64,
    pub schedule_id: String,
    pub trigger: TriggerType,
    pub run_id: Option<String>,
    pub success: Option<bool>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPolicy {
    pub notify_on_failure: bool,
    pub notify_on_success: bool,
}

impl NotificationPolicy {
    pub fn should_notify(&self, status: RunStatus) -> bool {
        match status {
            RunStatus::Failed | RunStatus::Error => self.notify_on_failure,
            RunStatus::Completed => self.notify_on_success,
            RunStatus::Pending | RunStatus::Running => false,
        }
    }
}

// ============================================================================
// Status enums
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_str().as_bytes())))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ParseEnumError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Error,
}

text_enum!(RunStatus, "run status", {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
    Error => "error",
});

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Passed,
    Failed,
    Error,
}

text_enum!(OutcomeStatus, "outcome status", {
    Passed => "passed",
    Failed => "failed",
    Error => "error",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    Target,
    GroupDefault,
}

text_enum!(ThresholdSource, "threshold source", {
    Target => "target",
    GroupDefault => "group_default",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Scheduled,
    Manual,
}

text_enum!(TriggerType, "trigger type", {
    Scheduled => "scheduled",
    Manual => "manual",
});

impl TriggerType {
    /// Terminal status for a pass that aborted before finishing.
    pub fn failure_status(&self) -> RunStatus {
        match self {
            TriggerType::Manual => RunStatus::Failed,
            TriggerType::Scheduled => RunStatus::Error,
        }
    }
}
