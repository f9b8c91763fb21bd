//! Program catalog read side.
//!
//! The catalog is tenant-agnostic and mutated by import jobs outside this
//! service; here live the lookups the matcher depends on plus the
//! deadline-expiry sweep.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::models::program::{Program, ProgramRow};
use crate::utils::{ApiError, ApiResult};

#[derive(Clone)]
pub struct ProgramService {
    pool: SqlitePool,
}

impl ProgramService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All currently active programs, ordered deterministically by name.
    pub async fn list_active(&self) -> ApiResult<Vec<Program>> {
        let rows: Vec<ProgramRow> =
            sqlx::query_as("SELECT * FROM programs WHERE status = 'active' ORDER BY name ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Program::try_from).collect()
    }

    pub async fn get(&self, id: &str) -> ApiResult<Program> {
        let row: Option<ProgramRow> = sqlx::query_as("SELECT * FROM programs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Program::try_from)
            .transpose()?
            .ok_or_else(|| ApiError::not_found(format!("Program {} not found", id)))
    }

    /// Lookup by import provenance.
    pub async fn get_by_source(&self, source: &str, source_id: &str) -> ApiResult<Option<Program>> {
        let row: Option<ProgramRow> =
            sqlx::query_as("SELECT * FROM programs WHERE source = ? AND source_id = ?")
                .bind(source)
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Program::try_from).transpose()
    }

    /// Soft-close active programs whose fixed deadline has passed.
    /// Returns the number of programs transitioned.
    pub async fn expire_overdue(&self) -> ApiResult<u64> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"UPDATE programs SET status = 'closed', updated_at = ?
               WHERE status = 'active' AND deadline_type = 'fixed'
                 AND deadline IS NOT NULL AND deadline < ?"#,
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::info!("Expired {} overdue programs", expired);
        }
        Ok(expired)
    }
}
