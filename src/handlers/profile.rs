use axum::{
    Json,
    extract::{Extension, Path, State},
};
use std::sync::Arc;

use crate::AppState;
use crate::middleware::TenantContext;
use crate::models::profile::{CreateProfileRequest, ProfileResponse, UpdateProfileRequest};
use crate::utils::ApiResult;

// Create a company profile
#[utoipa::path(
    post,
    path = "/api/profiles",
    request_body = CreateProfileRequest,
    responses(
        (status = 200, description = "Profile created", body = ProfileResponse),
        (status = 400, description = "Bad request")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Profiles"
)]
pub async fn create_profile(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<CreateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    tracing::info!("Profile creation by user {} (tenant {})", ctx.user_id, ctx.tenant_id);
    let profile = state.profile_service.create(ctx.tenant_id, req).await?;
    Ok(Json(profile.into()))
}

// List profiles of the tenant
#[utoipa::path(
    get,
    path = "/api/profiles",
    responses(
        (status = 200, description = "Company profiles", body = Vec<ProfileResponse>)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Profiles"
)]
pub async fn list_profiles(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<Vec<ProfileResponse>>> {
    let profiles = state.profile_service.list(ctx.tenant_id).await?;
    Ok(Json(profiles.into_iter().map(Into::into).collect()))
}

// Fetch one profile
#[utoipa::path(
    get,
    path = "/api/profiles/{id}",
    params(
        ("id" = String, Path, description = "Profile ID")
    ),
    responses(
        (status = 200, description = "Profile details", body = ProfileResponse),
        (status = 404, description = "Profile not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Profiles"
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state.profile_service.get(ctx.tenant_id, &id).await?;
    Ok(Json(profile.into()))
}

// Update a profile; invalidates its memoized search result
#[utoipa::path(
    put,
    path = "/api/profiles/{id}",
    params(
        ("id" = String, Path, description = "Profile ID")
    ),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileResponse),
        (status = 404, description = "Profile not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Profiles"
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state.profile_service.update(ctx.tenant_id, &id, req).await?;
    Ok(Json(profile.into()))
}

// Delete a profile
#[utoipa::path(
    delete,
    path = "/api/profiles/{id}",
    params(
        ("id" = String, Path, description = "Profile ID")
    ),
    responses(
        (status = 200, description = "Profile deleted"),
        (status = 404, description = "Profile not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Profiles"
)]
pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.profile_service.delete(ctx.tenant_id, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}
