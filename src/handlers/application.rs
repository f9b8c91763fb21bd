use axum::{
    Json,
    extract::{Extension, Path, State},
};
use std::sync::Arc;

use crate::AppState;
use crate::middleware::TenantContext;
use crate::models::application::{
    AddAttachmentRequest, Application, ApplicationStats, CreateApplicationRequest,
    TransitionRequest, UpdateApplicationRequest,
};
use crate::utils::ApiResult;

// Create a funding application
#[utoipa::path(
    post,
    path = "/api/applications",
    request_body = CreateApplicationRequest,
    responses(
        (status = 200, description = "Application created"),
        (status = 404, description = "Profile or program not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Applications"
)]
pub async fn create_application(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<CreateApplicationRequest>,
) -> ApiResult<Json<Application>> {
    tracing::info!(
        "Application creation by user {} (tenant {}): program={}",
        ctx.user_id,
        ctx.tenant_id,
        req.program_id
    );
    let application = state
        .application_service
        .create(ctx.tenant_id, req, Some(&ctx.username))
        .await?;
    Ok(Json(application))
}

// List applications of the tenant
#[utoipa::path(
    get,
    path = "/api/applications",
    responses(
        (status = 200, description = "Applications")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Applications"
)]
pub async fn list_applications(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<Vec<Application>>> {
    let applications = state.application_service.list(ctx.tenant_id).await?;
    Ok(Json(applications))
}

// Aggregated application statistics
#[utoipa::path(
    get,
    path = "/api/applications/stats",
    responses(
        (status = 200, description = "Application statistics", body = ApplicationStats)
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Applications"
)]
pub async fn application_stats(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<ApplicationStats>> {
    let stats = state.application_service.stats(ctx.tenant_id).await?;
    Ok(Json(stats))
}

// Fetch one application
#[utoipa::path(
    get,
    path = "/api/applications/{id}",
    params(
        ("id" = String, Path, description = "Application ID")
    ),
    responses(
        (status = 200, description = "Application details"),
        (status = 404, description = "Application not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Applications"
)]
pub async fn get_application(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<Application>> {
    let application = state.application_service.get(ctx.tenant_id, &id).await?;
    Ok(Json(application))
}

// Update amounts, references and notes
#[utoipa::path(
    put,
    path = "/api/applications/{id}",
    params(
        ("id" = String, Path, description = "Application ID")
    ),
    request_body = UpdateApplicationRequest,
    responses(
        (status = 200, description = "Application updated"),
        (status = 404, description = "Application not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Applications"
)]
pub async fn update_application(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateApplicationRequest>,
) -> ApiResult<Json<Application>> {
    let application = state.application_service.update(ctx.tenant_id, &id, req).await?;
    Ok(Json(application))
}

// Move an application along the lifecycle
#[utoipa::path(
    put,
    path = "/api/applications/{id}/status",
    params(
        ("id" = String, Path, description = "Application ID")
    ),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Status changed"),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Applications"
)]
pub async fn transition_application(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Json<Application>> {
    let application = state.application_service.transition(ctx.tenant_id, &id, req).await?;
    Ok(Json(application))
}

// Register an attachment
#[utoipa::path(
    post,
    path = "/api/applications/{id}/attachments",
    params(
        ("id" = String, Path, description = "Application ID")
    ),
    request_body = AddAttachmentRequest,
    responses(
        (status = 200, description = "Attachment added"),
        (status = 400, description = "Duplicate filename")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Applications"
)]
pub async fn add_attachment(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(req): Json<AddAttachmentRequest>,
) -> ApiResult<Json<Application>> {
    let application = state.application_service.add_attachment(ctx.tenant_id, &id, req).await?;
    Ok(Json(application))
}

// Remove an attachment by filename
#[utoipa::path(
    delete,
    path = "/api/applications/{id}/attachments/{filename}",
    params(
        ("id" = String, Path, description = "Application ID"),
        ("filename" = String, Path, description = "Attachment filename")
    ),
    responses(
        (status = 200, description = "Attachment removed"),
        (status = 404, description = "Attachment not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Applications"
)]
pub async fn remove_attachment(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path((id, filename)): Path<(String, String)>,
) -> ApiResult<Json<Application>> {
    let application = state
        .application_service
        .remove_attachment(ctx.tenant_id, &id, &filename)
        .await?;
    Ok(Json(application))
}
