use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::utils::{ApiError, JwtUtil};

#[derive(Clone)]
pub struct AuthState {
    pub jwt_util: Arc<JwtUtil>,
}

/// Resolved tenant scope, inserted into request extensions for handlers
/// and passed down into services for repository-level scoping.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct TenantContext {
    pub user_id: i64,
    pub username: String,
    pub tenant_id: i64,
}

/// Bearer-token middleware: verifies the JWT and attaches a
/// [`TenantContext`]. Authorization beyond tenant scoping is handled by a
/// separate service and is not part of this core.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let method = req.method().to_string();
    let uri = req.uri().path().to_string();

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing authorization header for {} {}", method, uri);
            ApiError::unauthorized("Missing authorization header")
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::warn!("Invalid authorization header format for {} {}", method, uri);
        ApiError::unauthorized("Invalid authorization header format")
    })?;

    let claims = state.jwt_util.verify_token(token).map_err(|err| {
        tracing::warn!("JWT verification failed for {} {}: {:?}", method, uri, err);
        err
    })?;

    let user_id = claims.sub.parse::<i64>().unwrap_or_default();
    let ctx = TenantContext { user_id, username: claims.username, tenant_id: claims.tenant_id };

    tracing::debug!(
        "Authenticated user {} (ID: {}, tenant: {}) on {} {}",
        ctx.username,
        ctx.user_id,
        ctx.tenant_id,
        method,
        uri
    );

    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}
