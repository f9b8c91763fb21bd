//! Company profile service: tenant-scoped CRUD.
//!
//! Profile mutations invalidate the per-search cache layer so a stale
//! match list is never served for changed company data.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::result_cache::ResultCaches;
use crate::models::profile::{
    CompanyProfile, CompanyProfileRow, CreateProfileRequest, UpdateProfileRequest,
    validate_industry_codes,
};
use crate::utils::{ApiError, ApiResult};

#[derive(Clone)]
pub struct ProfileService {
    pool: SqlitePool,
    caches: Arc<ResultCaches>,
}

impl ProfileService {
    pub fn new(pool: SqlitePool, caches: Arc<ResultCaches>) -> Self {
        Self { pool, caches }
    }

    pub async fn create(&self, tenant_id: i64, req: CreateProfileRequest) -> ApiResult<CompanyProfile> {
        req.validate()?;
        validate_industry_codes(&req.industry_codes)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO company_profiles
               (id, tenant_id, name, legal_form, founded_year, state, employees,
                annual_revenue, balance_total, industry, industry_codes_json,
                is_startup, project_description, investment_amount,
                project_topics_json, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(req.name.trim())
        .bind(&req.legal_form)
        .bind(req.founded_year)
        .bind(&req.state)
        .bind(req.employees)
        .bind(req.annual_revenue)
        .bind(req.balance_total)
        .bind(&req.industry)
        .bind(serde_json::to_string(&req.industry_codes)?)
        .bind(req.is_startup)
        .bind(&req.project_description)
        .bind(req.investment_amount)
        .bind(serde_json::to_string(&req.project_topics)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get(tenant_id, &id).await
    }

    pub async fn get(&self, tenant_id: i64, id: &str) -> ApiResult<CompanyProfile> {
        let row: Option<CompanyProfileRow> =
            sqlx::query_as("SELECT * FROM company_profiles WHERE id = ? AND tenant_id = ?")
                .bind(id)
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(CompanyProfile::try_from)
            .transpose()?
            .ok_or_else(|| ApiError::not_found(format!("Profile {} not found", id)))
    }

    pub async fn list(&self, tenant_id: i64) -> ApiResult<Vec<CompanyProfile>> {
        let rows: Vec<CompanyProfileRow> = sqlx::query_as(
            "SELECT * FROM company_profiles WHERE tenant_id = ? ORDER BY created_at DESC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CompanyProfile::try_from).collect()
    }

    pub async fn update(
        &self,
        tenant_id: i64,
        id: &str,
        req: UpdateProfileRequest,
    ) -> ApiResult<CompanyProfile> {
        req.validate()?;
        if let Some(codes) = &req.industry_codes {
            validate_industry_codes(codes)?;
        }
        let current = self.get(tenant_id, id).await?;

        let industry_codes = req.industry_codes.unwrap_or(current.industry_codes);
        let project_topics = req.project_topics.unwrap_or(current.project_topics);

        sqlx::query(
            r#"UPDATE company_profiles SET
               name = ?, legal_form = ?, founded_year = ?, state = ?, employees = ?,
               annual_revenue = ?, balance_total = ?, industry = ?,
               industry_codes_json = ?, is_startup = ?, project_description = ?,
               investment_amount = ?, project_topics_json = ?, updated_at = ?
               WHERE id = ? AND tenant_id = ?"#,
        )
        .bind(req.name.unwrap_or(current.name))
        .bind(req.legal_form.or(current.legal_form))
        .bind(req.founded_year.or(current.founded_year))
        .bind(req.state.or(current.state))
        .bind(req.employees.or(current.employees))
        .bind(req.annual_revenue.or(current.annual_revenue))
        .bind(req.balance_total.or(current.balance_total))
        .bind(req.industry.or(current.industry))
        .bind(serde_json::to_string(&industry_codes)?)
        .bind(req.is_startup.unwrap_or(current.is_startup))
        .bind(req.project_description.unwrap_or(current.project_description))
        .bind(req.investment_amount.or(current.investment_amount))
        .bind(serde_json::to_string(&project_topics)?)
        .bind(Utc::now())
        .bind(id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        // Changed company data invalidates the memoized search output.
        self.caches.invalidate_search(id).await;

        self.get(tenant_id, id).await
    }

    pub async fn delete(&self, tenant_id: i64, id: &str) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM company_profiles WHERE id = ? AND tenant_id = ?")
            .bind(id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found(format!("Profile {} not found", id)));
        }

        self.caches.invalidate_search(id).await;
        Ok(())
    }

    /// Stamp the profile after a completed search run.
    pub async fn touch_last_search(&self, id: &str) -> ApiResult<()> {
        sqlx::query("UPDATE company_profiles SET last_search_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
