//! Monitor service
//!
//! CRUD over monitors plus the periodic check: re-run the matcher per
//! active monitor, emit notifications above threshold, deduplicate per
//! (monitor, program), and honour the digest cadence contract.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::matching::Match;
use super::search_service::{SearchInput, SearchService};
use crate::models::monitor::{
    CreateMonitorRequest, DigestCadence, Monitor, Notification, UpdateMonitorRequest,
};
use crate::utils::{ApiError, ApiResult};

/// Notification summaries are free text, capped around 2 KiB.
const MAX_SUMMARY_LEN: usize = 2048;

#[derive(Clone)]
pub struct MonitorService {
    pool: SqlitePool,
}

impl MonitorService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    pub async fn create(&self, tenant_id: i64, req: CreateMonitorRequest) -> ApiResult<Monitor> {
        req.validate()?;
        let cadence = DigestCadence::parse(&req.digest_cadence)?;

        // The profile must exist within the tenant scope.
        let profile_exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM company_profiles WHERE id = ? AND tenant_id = ?")
                .bind(&req.profile_id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        if profile_exists.is_none() {
            return Err(ApiError::not_found(format!("Profile {} not found", req.profile_id)));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO monitors
               (id, tenant_id, profile_id, active, min_score_threshold,
                notify_email, notify_portal, digest_cadence, created_at, updated_at)
               VALUES (?, ?, ?, TRUE, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(&req.profile_id)
        .bind(req.min_score_threshold)
        .bind(req.notify_email)
        .bind(req.notify_portal)
        .bind(cadence.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, &id).await
    }

    pub async fn get(&self, tenant_id: i64, id: &str) -> ApiResult<Monitor> {
        let monitor: Option<Monitor> =
            sqlx::query_as("SELECT * FROM monitors WHERE id = ? AND tenant_id = ?")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        monitor.ok_or_else(|| ApiError::not_found(format!("Monitor {} not found", id)))
    }

    pub async fn list(&self, tenant_id: i64) -> ApiResult<Vec<Monitor>> {
        let monitors: Vec<Monitor> =
            sqlx::query_as("SELECT * FROM monitors WHERE tenant_id = ? ORDER BY created_at DESC")
                .bind(tenant_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(monitors)
    }

    pub async fn update(
        &self,
        tenant_id: i64,
        id: &str,
        req: UpdateMonitorRequest,
    ) -> ApiResult<Monitor> {
        req.validate()?;
        let current = self.get(tenant_id, id).await?;

        let cadence = match &req.digest_cadence {
            Some(c) => DigestCadence::parse(c)?.as_str().to_string(),
            None => current.digest_cadence,
        };

        sqlx::query(
            r#"UPDATE monitors SET
               active = ?, min_score_threshold = ?, notify_email = ?,
               notify_portal = ?, digest_cadence = ?, updated_at = ?
               WHERE id = ? AND tenant_id = ?"#,
        )
        .bind(req.active.unwrap_or(current.active))
        .bind(req.min_score_threshold.unwrap_or(current.min_score_threshold))
        .bind(req.notify_email.unwrap_or(current.notify_email))
        .bind(req.notify_portal.unwrap_or(current.notify_portal))
        .bind(cadence)
        .bind(Utc::now())
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, id).await
    }

    pub async fn delete(&self, tenant_id: i64, id: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM monitors WHERE id = ? AND tenant_id = ?")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Monitor {} not found", id)));
        }

        sqlx::query("DELETE FROM notifications WHERE monitor_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Periodic check
    // ========================================================================

    /// One sweep over all active monitors, processed strictly
    /// sequentially in ascending last-check order (never-checked first)
    /// to bound starvation. A failing monitor is isolated: it is logged
    /// and the loop continues.
    pub async fn check_all(&self, search: &SearchService) -> ApiResult<MonitorSweepReport> {
        let monitors: Vec<Monitor> = sqlx::query_as(
            r#"SELECT * FROM monitors WHERE active = TRUE
               ORDER BY last_check_at IS NOT NULL, last_check_at ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut report = MonitorSweepReport::default();
        for monitor in monitors {
            report.checked += 1;
            match self.check_monitor(&monitor, search).await {
                Ok(inserted) => report.notifications_created += inserted,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Monitor {} check failed: {}", monitor.id, e);
                },
            }
        }

        tracing::info!(
            "Monitor sweep completed: {} checked, {} notifications, {} failed",
            report.checked,
            report.notifications_created,
            report.failed
        );
        Ok(report)
    }

    /// Re-run the matcher for one monitor and insert notifications for
    /// qualifying matches. Returns the number of notifications created.
    pub async fn check_monitor(&self, monitor: &Monitor, search: &SearchService) -> ApiResult<u64> {
        // Fail-soft on a deleted profile: the monitor is skipped, not failed.
        let profile_exists: Option<(String,)> =
            sqlx::query_as("SELECT id FROM company_profiles WHERE id = ? AND tenant_id = ?")
                .bind(&monitor.profile_id)
                .bind(monitor.tenant_id)
                .fetch_optional(&self.pool)
                .await?;
        if profile_exists.is_none() {
            tracing::warn!(
                "Monitor {} references missing profile {}, skipping",
                monitor.id,
                monitor.profile_id
            );
            return Ok(0);
        }

        let output = search
            .run(SearchInput {
                tenant_id: monitor.tenant_id,
                profile_id: Some(monitor.profile_id.clone()),
                profile: None,
                created_by: Some("monitor".to_string()),
                idempotency_key: None,
            })
            .await?;

        let mut inserted = 0u64;
        for m in &output.matches {
            let score = m.percent_score();
            if score < monitor.min_score_threshold {
                continue;
            }
            if self.has_open_notification(&monitor.id, &m.program_id).await? {
                continue;
            }
            self.insert_notification(monitor, m, score).await?;
            inserted += 1;
        }

        let now = Utc::now();
        if inserted > 0 {
            sqlx::query(
                r#"UPDATE monitors SET matches_found = matches_found + ?,
                   last_check_at = ?, last_notification_at = ?, updated_at = ?
                   WHERE id = ?"#,
            )
            .bind(inserted as i64)
            .bind(now)
            .bind(now)
            .bind(now)
            .bind(&monitor.id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("UPDATE monitors SET last_check_at = ?, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(&monitor.id)
                .execute(&self.pool)
                .await?;
        }

        Ok(inserted)
    }

    /// An undismissed, unviewed notification for the pair suppresses a new
    /// one; once viewed or dismissed, a fresh qualifying match notifies
    /// again.
    async fn has_open_notification(&self, monitor_id: &str, program_id: &str) -> ApiResult<bool> {
        let open: Option<(String,)> = sqlx::query_as(
            r#"SELECT id FROM notifications
               WHERE monitor_id = ? AND program_id = ?
                 AND dismissed = FALSE AND viewed_at IS NULL
               LIMIT 1"#,
        )
        .bind(monitor_id)
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(open.is_some())
    }

    async fn insert_notification(&self, monitor: &Monitor, m: &Match, score: i64) -> ApiResult<()> {
        let summary = match_summary(m);
        let now = Utc::now();

        // Immediate cadence stamps delivery on insert; daily/weekly
        // batches are flushed by the external digest dispatcher, which
        // stamps email_sent exactly once.
        let immediate = monitor.cadence() == DigestCadence::Immediate;
        let email_sent = immediate && monitor.notify_email;
        let portal_notified = immediate && monitor.notify_portal;

        sqlx::query(
            r#"INSERT INTO notifications
               (id, monitor_id, program_id, score, match_summary,
                email_sent, email_sent_at, portal_notified, portal_notified_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&monitor.id)
        .bind(&m.program_id)
        .bind(score)
        .bind(&summary)
        .bind(email_sent)
        .bind(email_sent.then_some(now))
        .bind(portal_notified)
        .bind(portal_notified.then_some(now))
        .bind(now)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            "Notification for monitor {}: program {} at {}%",
            monitor.id,
            m.program_id,
            score
        );
        Ok(())
    }

    // ========================================================================
    // Notification queries
    // ========================================================================

    pub async fn list_notifications(&self, tenant_id: i64) -> ApiResult<Vec<Notification>> {
        let notifications: Vec<Notification> = sqlx::query_as(
            r#"SELECT n.* FROM notifications n
               JOIN monitors m ON m.id = n.monitor_id
               WHERE m.tenant_id = ?
               ORDER BY n.created_at DESC"#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    pub async fn list_notifications_by_monitor(
        &self,
        tenant_id: i64,
        monitor_id: &str,
    ) -> ApiResult<Vec<Notification>> {
        // Scope check before listing.
        self.get(tenant_id, monitor_id).await?;
        let notifications: Vec<Notification> = sqlx::query_as(
            "SELECT * FROM notifications WHERE monitor_id = ? ORDER BY created_at DESC",
        )
        .bind(monitor_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    pub async fn mark_viewed(&self, tenant_id: i64, notification_id: &str) -> ApiResult<()> {
        let result = sqlx::query(
            r#"UPDATE notifications SET viewed_at = ?
               WHERE id = ? AND viewed_at IS NULL
                 AND monitor_id IN (SELECT id FROM monitors WHERE tenant_id = ?)"#,
        )
        .bind(Utc::now())
        .bind(notification_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Either absent, cross-tenant, or already viewed; look closer.
            let exists: Option<(String,)> = sqlx::query_as(
                r#"SELECT n.id FROM notifications n
                   JOIN monitors m ON m.id = n.monitor_id
                   WHERE n.id = ? AND m.tenant_id = ?"#,
            )
            .bind(notification_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;
            if exists.is_none() {
                return Err(ApiError::not_found(format!(
                    "Notification {} not found",
                    notification_id
                )));
            }
        }
        Ok(())
    }

    pub async fn dismiss(&self, tenant_id: i64, notification_id: &str) -> ApiResult<()> {
        let result = sqlx::query(
            r#"UPDATE notifications SET dismissed = TRUE
               WHERE id = ?
                 AND monitor_id IN (SELECT id FROM monitors WHERE tenant_id = ?)"#,
        )
        .bind(notification_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Notification {} not found", notification_id)));
        }
        Ok(())
    }

    /// Unsent notifications of monitors on the given digest cadence, for
    /// the external dispatcher.
    pub async fn list_unsent_email(&self, cadence: DigestCadence) -> ApiResult<Vec<Notification>> {
        let notifications: Vec<Notification> = sqlx::query_as(
            r#"SELECT n.* FROM notifications n
               JOIN monitors m ON m.id = n.monitor_id
               WHERE m.digest_cadence = ? AND m.notify_email = TRUE
                 AND n.email_sent = FALSE AND n.dismissed = FALSE
               ORDER BY n.created_at ASC"#,
        )
        .bind(cadence.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    /// Stamp email delivery exactly once: the guard on `email_sent`
    /// makes a second stamping attempt a no-op.
    pub async fn mark_email_sent(&self, notification_id: &str) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET email_sent = TRUE, email_sent_at = ? WHERE id = ? AND email_sent = FALSE",
        )
        .bind(Utc::now())
        .bind(notification_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Summary text: the verdict's matched criteria when available, otherwise
/// the strongest rule reasons.
fn match_summary(m: &Match) -> String {
    let parts: Vec<String> = match &m.verdict {
        Some(v) if !v.matched_criteria.is_empty() => v.matched_criteria.clone(),
        _ => m.rule_reasons.clone(),
    };

    let mut summary = if parts.is_empty() {
        format!("{} passt zum Profil", m.program_name)
    } else {
        format!("{}: {}", m.program_name, parts.join("; "))
    };

    if summary.len() > MAX_SUMMARY_LEN {
        let mut end = MAX_SUMMARY_LEN;
        while !summary.is_char_boundary(end) {
            end -= 1;
        }
        summary.truncate(end);
    }
    summary
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize)]
pub struct MonitorSweepReport {
    pub checked: u64,
    pub notifications_created: u64,
    pub failed: u64,
}
