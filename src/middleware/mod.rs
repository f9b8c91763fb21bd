pub mod auth;

pub use auth::{AuthState, TenantContext, auth_middleware};
