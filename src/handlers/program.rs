use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::AppState;
use crate::models::program::Program;
use crate::services::{CombinationAnalysis, PairValidation};
use crate::utils::ApiResult;

// List the active program catalog
#[utoipa::path(
    get,
    path = "/api/programs",
    responses(
        (status = 200, description = "Active funding programs")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Programs"
)]
pub async fn list_programs(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Program>>> {
    let programs = state.program_service.list_active().await?;
    Ok(Json(programs))
}

// Fetch one program
#[utoipa::path(
    get,
    path = "/api/programs/{id}",
    params(
        ("id" = String, Path, description = "Program ID")
    ),
    responses(
        (status = 200, description = "Program details"),
        (status = 404, description = "Program not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Programs"
)]
pub async fn get_program(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Program>> {
    let program = state.program_service.get(&id).await?;
    Ok(Json(program))
}

// Combination analysis for one primary program
#[utoipa::path(
    get,
    path = "/api/programs/{id}/combinations",
    params(
        ("id" = String, Path, description = "Primary program ID")
    ),
    responses(
        (status = 200, description = "Combination analysis", body = CombinationAnalysis),
        (status = 404, description = "Program not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Programs"
)]
pub async fn get_combinations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CombinationAnalysis>> {
    let analysis = state.combination_service.analyze(&id).await?;
    Ok(Json(analysis))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct ValidatePairRequest {
    pub program_a: String,
    pub program_b: String,
}

// Judge whether two programs may be combined
#[utoipa::path(
    post,
    path = "/api/programs/combinations/validate",
    request_body = ValidatePairRequest,
    responses(
        (status = 200, description = "Pair validation", body = PairValidation),
        (status = 404, description = "Program not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Programs"
)]
pub async fn validate_combination(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidatePairRequest>,
) -> ApiResult<Json<PairValidation>> {
    let validation = state
        .combination_service
        .validate_pair(&req.program_a, &req.program_b)
        .await?;
    Ok(Json(validation))
}
