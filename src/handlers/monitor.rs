use axum::{
    Json,
    extract::{Extension, Path, State},
};
use std::sync::Arc;

use crate::AppState;
use crate::middleware::TenantContext;
use crate::models::monitor::{CreateMonitorRequest, Monitor, Notification, UpdateMonitorRequest};
use crate::utils::ApiResult;

// Create a monitor for a profile
#[utoipa::path(
    post,
    path = "/api/monitors",
    request_body = CreateMonitorRequest,
    responses(
        (status = 200, description = "Monitor created"),
        (status = 404, description = "Profile not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Monitors"
)]
pub async fn create_monitor(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<CreateMonitorRequest>,
) -> ApiResult<Json<Monitor>> {
    tracing::info!(
        "Monitor creation by user {} (tenant {}): profile={}, threshold={}",
        ctx.user_id,
        ctx.tenant_id,
        req.profile_id,
        req.min_score_threshold
    );
    let monitor = state.monitor_service.create(ctx.tenant_id, req).await?;
    Ok(Json(monitor))
}

// List monitors of the tenant
#[utoipa::path(
    get,
    path = "/api/monitors",
    responses(
        (status = 200, description = "Monitors")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Monitors"
)]
pub async fn list_monitors(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<Vec<Monitor>>> {
    let monitors = state.monitor_service.list(ctx.tenant_id).await?;
    Ok(Json(monitors))
}

// Update a monitor
#[utoipa::path(
    put,
    path = "/api/monitors/{id}",
    params(
        ("id" = String, Path, description = "Monitor ID")
    ),
    request_body = UpdateMonitorRequest,
    responses(
        (status = 200, description = "Monitor updated"),
        (status = 404, description = "Monitor not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Monitors"
)]
pub async fn update_monitor(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateMonitorRequest>,
) -> ApiResult<Json<Monitor>> {
    let monitor = state.monitor_service.update(ctx.tenant_id, &id, req).await?;
    Ok(Json(monitor))
}

// Delete a monitor and its notifications
#[utoipa::path(
    delete,
    path = "/api/monitors/{id}",
    params(
        ("id" = String, Path, description = "Monitor ID")
    ),
    responses(
        (status = 200, description = "Monitor deleted"),
        (status = 404, description = "Monitor not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Monitors"
)]
pub async fn delete_monitor(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.monitor_service.delete(ctx.tenant_id, &id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

// List notifications of the tenant
#[utoipa::path(
    get,
    path = "/api/notifications",
    responses(
        (status = 200, description = "Notifications")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Monitors"
)]
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = state.monitor_service.list_notifications(ctx.tenant_id).await?;
    Ok(Json(notifications))
}

// Mark a notification as viewed
#[utoipa::path(
    put,
    path = "/api/notifications/{id}/viewed",
    params(
        ("id" = String, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification marked as viewed"),
        (status = 404, description = "Notification not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Monitors"
)]
pub async fn mark_notification_viewed(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.monitor_service.mark_viewed(ctx.tenant_id, &id).await?;
    Ok(Json(serde_json::json!({ "viewed": id })))
}

// Dismiss a notification
#[utoipa::path(
    put,
    path = "/api/notifications/{id}/dismiss",
    params(
        ("id" = String, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification dismissed"),
        (status = 404, description = "Notification not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Monitors"
)]
pub async fn dismiss_notification(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.monitor_service.dismiss(ctx.tenant_id, &id).await?;
    Ok(Json(serde_json::json!({ "dismissed": id })))
}
