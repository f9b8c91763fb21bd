//! Application lifecycle service
//!
//! State machine over funding applications. Every accepted transition
//! appends exactly one timeline entry; illegal edges are rejected as
//! precondition failures and leave the record untouched.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

use crate::models::application::{
    AddAttachmentRequest, Application, ApplicationStats, ApplicationStatus, Attachment,
    CreateApplicationRequest, StatusCount, TimelineEntry, TransitionRequest,
    UpdateApplicationRequest,
};
use crate::utils::{ApiError, ApiResult};

#[derive(Clone)]
pub struct ApplicationService {
    pool: SqlitePool,
}

impl ApplicationService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        tenant_id: i64,
        req: CreateApplicationRequest,
        author: Option<&str>,
    ) -> ApiResult<Application> {
        req.validate()?;

        let profile_exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM company_profiles WHERE id = ? AND tenant_id = ?")
                .bind(&req.profile_id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        if profile_exists.is_none() {
            return Err(ApiError::not_found(format!("Profile {} not found", req.profile_id)));
        }

        let program_exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM programs WHERE id = ?")
                .bind(&req.program_id)
                .fetch_optional(&self.pool)
                .await?;
        if program_exists.is_none() {
            return Err(ApiError::not_found(format!("Program {} not found", req.program_id)));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let timeline = vec![TimelineEntry {
            date: now,
            status: ApplicationStatus::Planned.as_str().to_string(),
            description: "Antrag angelegt".to_string(),
            author: author.map(|a| a.to_string()),
        }];

        sqlx::query(
            r#"INSERT INTO applications
               (id, tenant_id, profile_id, program_id, status, internal_reference,
                requested_amount, notes, attachments_json, timeline_json,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, 'planned', ?, ?, ?, '[]', ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(&req.profile_id)
        .bind(&req.program_id)
        .bind(&req.internal_reference)
        .bind(req.requested_amount)
        .bind(&req.notes)
        .bind(serde_json::to_string(&timeline)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, &id).await
    }

    pub async fn get(&self, tenant_id: i64, id: &str) -> ApiResult<Application> {
        let application: Option<Application> =
            sqlx::query_as("SELECT * FROM applications WHERE id = ? AND tenant_id = ?")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        application.ok_or_else(|| ApiError::not_found(format!("Application {} not found", id)))
    }

    pub async fn list(&self, tenant_id: i64) -> ApiResult<Vec<Application>> {
        let applications: Vec<Application> = sqlx::query_as(
            "SELECT * FROM applications WHERE tenant_id = ? ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(applications)
    }

    pub async fn update(
        &self,
        tenant_id: i64,
        id: &str,
        req: UpdateApplicationRequest,
    ) -> ApiResult<Application> {
        req.validate()?;
        let current = self.get(tenant_id, id).await?;

        let requested = req.requested_amount.or(current.requested_amount);
        let approved = req.approved_amount.or(current.approved_amount);

        // Approved never exceeds what the program caps or what was asked
        // for, whichever is higher.
        if let Some(approved_amount) = approved {
            let program_max: Option<(Option<i64>,)> =
                sqlx::query_as("SELECT max_amount FROM programs WHERE id = ?")
                    .bind(&current.program_id)
                    .fetch_optional(&self.pool)
                    .await?;
            let cap = match (program_max.and_then(|(m,)| m), requested) {
                (Some(max), Some(r)) => Some(max.max(r)),
                (Some(max), None) => Some(max),
                (None, r) => r,
            };
            if let Some(cap) = cap
                && approved_amount > cap
            {
                return Err(ApiError::invalid_data(format!(
                    "Approved amount {} exceeds the admissible maximum {}",
                    approved_amount, cap
                )));
            }
        }

        sqlx::query(
            r#"UPDATE applications SET
               requested_amount = ?, approved_amount = ?, internal_reference = ?,
               decision_notes = ?, notes = ?, updated_at = ?
               WHERE id = ? AND tenant_id = ?"#,
        )
        .bind(requested)
        .bind(approved)
        .bind(req.internal_reference.or(current.internal_reference))
        .bind(req.decision_notes.or(current.decision_notes))
        .bind(req.notes.or(current.notes))
        .bind(Utc::now())
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, id).await
    }

    /// Move an application along the lifecycle graph. The transition and
    /// its timeline entry are persisted atomically.
    pub async fn transition(
        &self,
        tenant_id: i64,
        id: &str,
        req: TransitionRequest,
    ) -> ApiResult<Application> {
        let current = self.get(tenant_id, id).await?;
        let from = current.status_enum()?;
        let to = ApplicationStatus::parse(&req.status)?;

        if !from.can_transition_to(to) {
            return Err(ApiError::precondition_failed(format!(
                "Transition {} -> {} is not allowed",
                from.as_str(),
                to.as_str()
            )));
        }

        let now = Utc::now();
        let mut timeline = current.timeline()?;
        timeline.push(TimelineEntry {
            date: now,
            status: to.as_str().to_string(),
            description: req
                .description
                .unwrap_or_else(|| format!("Status: {}", to.as_str())),
            author: req.author,
        });

        let submitted_at = if to == ApplicationStatus::Submitted {
            Some(now)
        } else {
            current.submitted_at
        };
        let decision_date =
            if matches!(to, ApplicationStatus::Approved | ApplicationStatus::Rejected) {
                Some(now)
            } else {
                current.decision_date
            };

        sqlx::query(
            r#"UPDATE applications SET
               status = ?, timeline_json = ?, submitted_at = ?, decision_date = ?, updated_at = ?
               WHERE id = ? AND tenant_id = ?"#,
        )
        .bind(to.as_str())
        .bind(serde_json::to_string(&timeline)?)
        .bind(submitted_at)
        .bind(decision_date)
        .bind(now)
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, id).await
    }

    pub async fn delete(&self, tenant_id: i64, id: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM applications WHERE id = ? AND tenant_id = ?")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Application {} not found", id)));
        }
        Ok(())
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    pub async fn add_attachment(
        &self,
        tenant_id: i64,
        id: &str,
        req: AddAttachmentRequest,
    ) -> ApiResult<Application> {
        let current = self.get(tenant_id, id).await?;
        let mut attachments = current.attachments()?;

        let filename = req.filename.trim().to_string();
        if filename.is_empty() {
            return Err(ApiError::invalid_data("Attachment filename must not be empty"));
        }
        if attachments.iter().any(|a| a.filename == filename) {
            return Err(ApiError::invalid_data(format!(
                "Attachment {} already exists",
                filename
            )));
        }

        attachments.push(Attachment {
            filename,
            uploaded_at: Utc::now(),
            size_bytes: req.size_bytes,
            content_type: req.content_type,
        });

        sqlx::query(
            "UPDATE applications SET attachments_json = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
        )
        .bind(serde_json::to_string(&attachments)?)
        .bind(Utc::now())
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, id).await
    }

    pub async fn remove_attachment(
        &self,
        tenant_id: i64,
        id: &str,
        filename: &str,
    ) -> ApiResult<Application> {
        let current = self.get(tenant_id, id).await?;
        let mut attachments = current.attachments()?;

        let before = attachments.len();
        attachments.retain(|a| a.filename != filename);
        if attachments.len() == before {
            return Err(ApiError::not_found(format!("Attachment {} not found", filename)));
        }

        sqlx::query(
            "UPDATE applications SET attachments_json = ?, updated_at = ? WHERE id = ? AND tenant_id = ?",
        )
        .bind(serde_json::to_string(&attachments)?)
        .bind(Utc::now())
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, id).await
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub async fn stats(&self, tenant_id: i64) -> ApiResult<ApplicationStats> {
        let by_status: Vec<StatusCount> = sqlx::query_as(
            r#"SELECT status, COUNT(*) as count FROM applications
               WHERE tenant_id = ? GROUP BY status ORDER BY status"#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let sums: (Option<i64>, Option<i64>) = sqlx::query_as(
            r#"SELECT SUM(requested_amount), SUM(approved_amount)
               FROM applications WHERE tenant_id = ?"#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ApplicationStats {
            by_status,
            total_requested: sums.0.unwrap_or(0),
            total_approved: sums.1.unwrap_or(0),
        })
    }
}
