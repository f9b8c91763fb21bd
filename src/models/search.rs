//! Search session models
//!
//! A `SearchSession` is the durable record of one end-to-end match run,
//! including token/cost accounting and the serialized match list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Session status. Progression is monotonic: pending, rule_filtering,
/// llm_analysis, completed; any state may fall to failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Pending,
    RuleFiltering,
    LlmAnalysis,
    Completed,
    Failed,
}

impl SearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::RuleFiltering => "rule_filtering",
            Self::LlmAnalysis => "llm_analysis",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "rule_filtering" => Self::RuleFiltering,
            "llm_analysis" => Self::LlmAnalysis,
            "completed" => Self::Completed,
            _ => Self::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::RuleFiltering => 1,
            Self::LlmAnalysis => 2,
            Self::Completed => 3,
            Self::Failed => 4,
        }
    }

    /// Forward moves and the drop to `failed` are the only legal edges.
    pub fn can_transition_to(&self, next: SearchStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next.rank() > self.rank()
    }

    /// Progress percentage reported while a session sits in this state.
    pub fn progress(&self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::RuleFiltering => 10,
            Self::LlmAnalysis => 50,
            Self::Completed => 100,
            Self::Failed => 100,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SearchSession {
    pub id: String,
    pub tenant_id: i64,
    pub profile_id: String,
    pub status: String,
    pub phase: String,
    pub progress: i64,
    pub total_programs: i64,
    pub total_matches: i64,
    pub matches_json: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_cents: i64,
    pub created_by: Option<String>,
    pub idempotency_key: Option<String>,
}

impl SearchSession {
    pub fn status_enum(&self) -> SearchStatus {
        SearchStatus::parse(&self.status)
    }
}
