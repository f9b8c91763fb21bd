//! Monitor and notification models
//!
//! A monitor binds a profile to a periodic re-evaluation; notifications
//! are its above-threshold emissions, deduplicated per (monitor, program).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestCadence {
    Immediate,
    Daily,
    Weekly,
}

impl DigestCadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }

    pub fn parse(s: &str) -> ApiResult<Self> {
        match s {
            "immediate" => Ok(Self::Immediate),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            other => Err(ApiError::invalid_data(format!("Unknown digest cadence: {}", other))),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Monitor {
    pub id: String,
    pub tenant_id: i64,
    pub profile_id: String,
    pub active: bool,
    pub min_score_threshold: i64,
    pub notify_email: bool,
    pub notify_portal: bool,
    pub digest_cadence: String,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_notification_at: Option<DateTime<Utc>>,
    pub matches_found: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    pub fn cadence(&self) -> DigestCadence {
        DigestCadence::parse(&self.digest_cadence).unwrap_or(DigestCadence::Immediate)
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: String,
    pub monitor_id: String,
    pub program_id: String,
    pub score: i64,
    pub match_summary: String,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub portal_notified: bool,
    pub portal_notified_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub dismissed: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request shapes
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateMonitorRequest {
    pub profile_id: String,
    #[validate(range(min = 0, max = 100))]
    #[serde(default = "default_threshold")]
    pub min_score_threshold: i64,
    #[serde(default = "default_true")]
    pub notify_email: bool,
    #[serde(default = "default_true")]
    pub notify_portal: bool,
    #[serde(default = "default_cadence")]
    pub digest_cadence: String,
}

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateMonitorRequest {
    pub active: Option<bool>,
    #[validate(range(min = 0, max = 100))]
    pub min_score_threshold: Option<i64>,
    pub notify_email: Option<bool>,
    pub notify_portal: Option<bool>,
    pub digest_cadence: Option<String>,
}

fn default_threshold() -> i64 {
    70
}
fn default_true() -> bool {
    true
}
fn default_cadence() -> String {
    "immediate".to_string()
}
