use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use std::sync::Arc;

use crate::AppState;
use crate::middleware::TenantContext;
use crate::models::search::SearchSession;
use crate::services::{SearchInput, SearchOutput};
use crate::utils::ApiResult;

// Run a matching search for a stored or inline profile
#[utoipa::path(
    post,
    path = "/api/search",
    request_body = SearchInput,
    responses(
        (status = 200, description = "Search completed", body = SearchOutput),
        (status = 400, description = "Bad request")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Search"
)]
pub async fn run_search(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Json(mut input): Json<SearchInput>,
) -> ApiResult<Json<SearchOutput>> {
    tracing::info!(
        "Search request by user {} (tenant {}): profile_id={:?}",
        ctx.user_id,
        ctx.tenant_id,
        input.profile_id
    );

    input.tenant_id = ctx.tenant_id;
    input.created_by = Some(ctx.username.clone());

    let output = state.search_service.run(input).await?;

    tracing::info!(
        "Search {} completed: {} matches out of {} programs in {}ms",
        output.session_id,
        output.total_matches,
        output.total_programs,
        output.duration_ms
    );
    Ok(Json(output))
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct SessionListQuery {
    /// Restrict to sessions of one profile
    pub profile_id: Option<String>,
}

// List search sessions of the tenant
#[utoipa::path(
    get,
    path = "/api/search/sessions",
    params(SessionListQuery),
    responses(
        (status = 200, description = "Search sessions")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Search"
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<SessionListQuery>,
) -> ApiResult<Json<Vec<SearchSession>>> {
    let sessions = match query.profile_id {
        Some(profile_id) => {
            state
                .search_service
                .list_sessions_by_profile(ctx.tenant_id, &profile_id)
                .await?
        },
        None => state.search_service.list_sessions(ctx.tenant_id).await?,
    };
    Ok(Json(sessions))
}

// Fetch one search session
#[utoipa::path(
    get,
    path = "/api/search/sessions/{id}",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Search session"),
        (status = 404, description = "Session not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Search"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<SearchSession>> {
    let session = state.search_service.get_session(ctx.tenant_id, &id).await?;
    Ok(Json(session))
}
