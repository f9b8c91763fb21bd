//! Foerderscout Library
//!
//! Matching and monitoring service for a catalog of Austrian public
//! funding programs. This library contains all core modules; the binary
//! in `main.rs` wires the HTTP router and background tasks.

use sqlx::SqlitePool;
use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use services::{
    ApplicationService, CombinationService, LLMAnalyst, LLMClient, LLMError, LLMVerdict, MonitorService,
    ProfileService, ProgramService, ResultCaches, SearchInput, SearchOutput, SearchService,
};
pub use utils::JwtUtil;

/// Application shared state
///
/// Design Philosophy: Keep it simple - Rust's type system IS our DI container.
/// All services are wrapped in Arc for cheap cloning and thread safety.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,

    pub jwt_util: Arc<JwtUtil>,
    pub caches: Arc<ResultCaches>,

    pub program_service: Arc<ProgramService>,
    pub profile_service: Arc<ProfileService>,
    pub search_service: Arc<SearchService>,
    pub monitor_service: Arc<MonitorService>,
    pub combination_service: Arc<CombinationService>,
    pub application_service: Arc<ApplicationService>,
}
