use axum::{
    Router,
    middleware as axum_middleware,
    routing::{delete, get, post, put},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use foerderscout::config::Config;
use foerderscout::services::{
    ApplicationService, CombinationService, LLMAnalyst, LLMClient, MonitorService, ProfileService,
    ProgramService, ResultCaches, SearchService,
};
use foerderscout::utils::JwtUtil;
use foerderscout::{AppState, db, handlers, middleware, models, services};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::search::run_search,
        handlers::search::list_sessions,
        handlers::search::get_session,

        handlers::program::list_programs,
        handlers::program::get_program,
        handlers::program::get_combinations,
        handlers::program::validate_combination,

        handlers::profile::create_profile,
        handlers::profile::list_profiles,
        handlers::profile::get_profile,
        handlers::profile::update_profile,
        handlers::profile::delete_profile,

        handlers::monitor::create_monitor,
        handlers::monitor::list_monitors,
        handlers::monitor::update_monitor,
        handlers::monitor::delete_monitor,
        handlers::monitor::list_notifications,
        handlers::monitor::mark_notification_viewed,
        handlers::monitor::dismiss_notification,

        handlers::application::create_application,
        handlers::application::list_applications,
        handlers::application::application_stats,
        handlers::application::get_application,
        handlers::application::update_application,
        handlers::application::transition_application,
        handlers::application::add_attachment,
        handlers::application::remove_attachment,
    ),
    components(
        schemas(
            models::CreateProfileRequest,
            models::UpdateProfileRequest,
            models::ProfileResponse,
            models::CreateMonitorRequest,
            models::UpdateMonitorRequest,
            models::CreateApplicationRequest,
            models::UpdateApplicationRequest,
            models::TransitionRequest,
            models::AddAttachmentRequest,
            models::ApplicationStats,
            models::StatusCount,
            services::SearchInput,
            services::SearchOutput,
            services::combination_service::CombinationAnalysis,
            services::combination_service::CombinationOption,
            services::combination_service::ExcludedCombination,
            services::combination_service::InferredCombination,
            services::combination_service::PairValidation,
            handlers::program::ValidatePairRequest,
        )
    ),
    tags(
        (name = "Search", description = "Matching searches and sessions"),
        (name = "Programs", description = "Funding program catalog and combinations"),
        (name = "Profiles", description = "Company profiles"),
        (name = "Monitors", description = "Monitors and notifications"),
        (name = "Applications", description = "Funding applications"),
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    // Keep the appender guard alive for the process lifetime.
    let mut _log_guard = None;
    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("foerderscout.log");
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        _log_guard = Some(guard);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Foerderscout starting up");

    let pool = db::init_db(&config.database.url).await?;

    let jwt_util = Arc::new(JwtUtil::new(&config.auth.jwt_secret, config.auth.jwt_expires_in_hours));
    let caches = Arc::new(ResultCaches::in_process());

    let program_service = Arc::new(ProgramService::new(pool.clone()));
    let profile_service = Arc::new(ProfileService::new(pool.clone(), Arc::clone(&caches)));

    let llm_client = LLMClient::from_config(&config.llm)
        .map(|client| Arc::new(client) as Arc<dyn LLMAnalyst>);
    match &llm_client {
        Some(_) => tracing::info!("Analyst client configured for model {}", config.llm.model),
        None => tracing::warn!("No analyst configured - searches run rule-only"),
    }

    let search_service = Arc::new(SearchService::new(
        pool.clone(),
        Arc::clone(&program_service),
        Arc::clone(&profile_service),
        llm_client,
        Arc::clone(&caches),
        config.search.clone(),
        config.llm.clone(),
    ));

    let monitor_service = Arc::new(MonitorService::new(pool.clone()));
    let combination_service = Arc::new(CombinationService::new(Arc::clone(&program_service)));
    let application_service = Arc::new(ApplicationService::new(pool.clone()));

    let app_state = Arc::new(AppState {
        db: pool.clone(),
        jwt_util: Arc::clone(&jwt_util),
        caches: Arc::clone(&caches),
        program_service: Arc::clone(&program_service),
        profile_service: Arc::clone(&profile_service),
        search_service: Arc::clone(&search_service),
        monitor_service: Arc::clone(&monitor_service),
        combination_service: Arc::clone(&combination_service),
        application_service: Arc::clone(&application_service),
    });

    // The background loops stop when their handles drop; keep them alive
    // for the whole serve call.
    let mut _background_handles = Vec::new();
    if config.monitor.enabled {
        _background_handles.push(services::start_monitor_check_task(
            Arc::clone(&monitor_service),
            Arc::clone(&search_service),
            config.monitor.check_interval_secs,
        ));
        _background_handles.push(services::start_catalog_expiry_task(
            Arc::clone(&program_service),
            config.monitor.expiry_interval_secs,
        ));
    } else {
        tracing::warn!("Monitor loop disabled by configuration");
    }

    let auth_state = middleware::AuthState { jwt_util: Arc::clone(&jwt_util) };

    let protected_routes = Router::new()
        .route("/api/search", post(handlers::search::run_search))
        .route("/api/search/sessions", get(handlers::search::list_sessions))
        .route("/api/search/sessions/:id", get(handlers::search::get_session))
        .route("/api/programs", get(handlers::program::list_programs))
        .route(
            "/api/programs/combinations/validate",
            post(handlers::program::validate_combination),
        )
        .route("/api/programs/:id", get(handlers::program::get_program))
        .route("/api/programs/:id/combinations", get(handlers::program::get_combinations))
        .route(
            "/api/profiles",
            get(handlers::profile::list_profiles).post(handlers::profile::create_profile),
        )
        .route(
            "/api/profiles/:id",
            get(handlers::profile::get_profile)
                .put(handlers::profile::update_profile)
                .delete(handlers::profile::delete_profile),
        )
        .route(
            "/api/monitors",
            get(handlers::monitor::list_monitors).post(handlers::monitor::create_monitor),
        )
        .route(
            "/api/monitors/:id",
            put(handlers::monitor::update_monitor).delete(handlers::monitor::delete_monitor),
        )
        .route("/api/notifications", get(handlers::monitor::list_notifications))
        .route(
            "/api/notifications/:id/viewed",
            put(handlers::monitor::mark_notification_viewed),
        )
        .route("/api/notifications/:id/dismiss", put(handlers::monitor::dismiss_notification))
        .route(
            "/api/applications",
            get(handlers::application::list_applications)
                .post(handlers::application::create_application),
        )
        .route("/api/applications/stats", get(handlers::application::application_stats))
        .route(
            "/api/applications/:id",
            get(handlers::application::get_application)
                .put(handlers::application::update_application),
        )
        .route("/api/applications/:id/status", put(handlers::application::transition_application))
        .route("/api/applications/:id/attachments", post(handlers::application::add_attachment))
        .route(
            "/api/applications/:id/attachments/:filename",
            delete(handlers::application::remove_attachment),
        )
        .with_state(Arc::clone(&app_state))
        .layer(axum_middleware::from_fn_with_state(auth_state, middleware::auth_middleware));

    let health_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check));

    let app = Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(protected_routes)
        .merge(health_routes)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("API documentation available at http://{}/api-docs", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ready_check() -> &'static str {
    "READY"
}
