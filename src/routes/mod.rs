pub mod groups;
pub mod health;
pub mod logs;
pub mod runs;
pub mod schedules;
pub mod settings;

use serde::{Deserialize, Serialize};

use crate::error::SentinelError;

pub type ApiResult<T> = Result<T, SentinelError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}
