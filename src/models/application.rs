//! Funding application models
//!
//! An application ("Antrag") references a program and a profile and moves
//! through a fixed lifecycle; every accepted transition appends a timeline
//! entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Planned,
    Drafting,
    Submitted,
    InReview,
    Approved,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Drafting => "drafting",
            Self::Submitted => "submitted",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub fn parse(s: &str) -> ApiResult<Self> {
        match s {
            "planned" => Ok(Self::Planned),
            "drafting" => Ok(Self::Drafting),
            "submitted" => Ok(Self::Submitted),
            "in_review" => Ok(Self::InReview),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "withdrawn" => Ok(Self::Withdrawn),
            other => Err(ApiError::invalid_data(format!("Unknown application status: {}", other))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Withdrawn)
    }

    /// Lifecycle graph: planned -> drafting -> submitted -> in_review ->
    /// (approved | rejected); any non-terminal state -> withdrawn.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        if next == Self::Withdrawn {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Self::Planned, Self::Drafting)
                | (Self::Drafting, Self::Submitted)
                | (Self::Submitted, Self::InReview)
                | (Self::InReview, Self::Approved)
                | (Self::InReview, Self::Rejected)
        )
    }
}

/// One entry of the ordered application timeline.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TimelineEntry {
    pub date: DateTime<Utc>,
    pub status: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// An uploaded attachment reference. Filenames are unique per application.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Attachment {
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Application {
    pub id: String,
    pub tenant_id: i64,
    pub profile_id: String,
    pub program_id: String,
    pub status: String,
    pub internal_reference: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub requested_amount: Option<i64>,
    pub approved_amount: Option<i64>,
    pub decision_date: Option<DateTime<Utc>>,
    pub decision_notes: Option<String>,
    pub attachments_json: String,
    pub timeline_json: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn status_enum(&self) -> ApiResult<ApplicationStatus> {
        ApplicationStatus::parse(&self.status)
    }

    pub fn timeline(&self) -> ApiResult<Vec<TimelineEntry>> {
        serde_json::from_str(&self.timeline_json)
            .map_err(|e| ApiError::internal_error(format!("Corrupt timeline column: {}", e)))
    }

    pub fn attachments(&self) -> ApiResult<Vec<Attachment>> {
        serde_json::from_str(&self.attachments_json)
            .map_err(|e| ApiError::internal_error(format!("Corrupt attachments column: {}", e)))
    }
}

// ============================================================================
// Request / stats shapes
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateApplicationRequest {
    pub profile_id: String,
    pub program_id: String,
    #[validate(range(min = 0))]
    pub requested_amount: Option<i64>,
    pub internal_reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, utoipa::ToSchema)]
pub struct UpdateApplicationRequest {
    #[validate(range(min = 0))]
    pub requested_amount: Option<i64>,
    #[validate(range(min = 0))]
    pub approved_amount: Option<i64>,
    pub internal_reference: Option<String>,
    pub decision_notes: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct TransitionRequest {
    pub status: String,
    pub description: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
pub struct AddAttachmentRequest {
    pub filename: String,
    pub size_bytes: Option<i64>,
    pub content_type: Option<String>,
}

/// Aggregated per-tenant application statistics.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ApplicationStats {
    pub by_status: Vec<StatusCount>,
    pub total_requested: i64,
    pub total_approved: i64,
}

#[derive(Debug, Clone, Serialize, FromRow, utoipa::ToSchema)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_edges() {
        use ApplicationStatus::*;
        assert!(Planned.can_transition_to(Drafting));
        assert!(Drafting.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(InReview));
        assert!(InReview.can_transition_to(Approved));
        assert!(InReview.can_transition_to(Rejected));
        // Withdrawal from any non-terminal state.
        assert!(Planned.can_transition_to(Withdrawn));
        assert!(InReview.can_transition_to(Withdrawn));
        assert!(!Approved.can_transition_to(Withdrawn));
        // No skipping or moving backwards.
        assert!(!Planned.can_transition_to(Submitted));
        assert!(!Approved.can_transition_to(Drafting));
        assert!(!Rejected.can_transition_to(InReview));
    }
}
