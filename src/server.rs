//! # Server Configuration
//!
//! This module contains the router assembly, shared application state, and
//! the OpenAPI document for the Dealer Sync API. Every route except the
//! service info root and the API docs sits behind operator bearer auth.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::crypto::CryptoKey;
use crate::handlers;
use crate::processors::ProcessorRegistry;
use crate::queue::JobQueue;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub queue: JobQueue,
    pub registry: Arc<ProcessorRegistry>,
    pub crypto_key: CryptoKey,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/jobs",
            post(handlers::jobs::create_job).get(handlers::jobs::list_jobs),
        )
        .route("/jobs/bulk", post(handlers::jobs::create_jobs_bulk))
        .route(
            "/jobs/{id}",
            get(handlers::jobs::get_job).delete(handlers::jobs::cancel_job),
        )
        .route("/queue/status", get(handlers::jobs::queue_status))
        .route("/fetch-logs", get(handlers::fetch_logs::list_fetch_logs))
        .route(
            "/dealers",
            get(handlers::dealers::list_dealers).post(handlers::dealers::create_dealer),
        )
        .route(
            "/dealers/{id}",
            get(handlers::dealers::get_dealer).patch(handlers::dealers::update_dealer),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .merge(protected)
        .layer(middleware::from_fn(telemetry::trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the API server and runs it until the shutdown token fires.
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("API server stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::jobs::create_job,
        crate::handlers::jobs::create_jobs_bulk,
        crate::handlers::jobs::get_job,
        crate::handlers::jobs::cancel_job,
        crate::handlers::jobs::list_jobs,
        crate::handlers::jobs::queue_status,
        crate::handlers::fetch_logs::list_fetch_logs,
        crate::handlers::dealers::list_dealers,
        crate::handlers::dealers::get_dealer,
        crate::handlers::dealers::create_dealer,
        crate::handlers::dealers::update_dealer,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::jobs::CreateJobRequest,
            crate::handlers::jobs::BulkCreateJobsRequest,
            crate::handlers::jobs::BulkJobOutcome,
            crate::handlers::jobs::BulkJobsResponse,
            crate::handlers::jobs::JobInfo,
            crate::handlers::jobs::JobsResponse,
            crate::handlers::jobs::QueueStatusResponse,
            crate::handlers::fetch_logs::FetchLogInfo,
            crate::handlers::fetch_logs::FetchLogsResponse,
            crate::handlers::dealers::DealerView,
            crate::handlers::dealers::DealersResponse,
            crate::handlers::dealers::CreateDealerRequest,
            crate::handlers::dealers::UpdateDealerRequest,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Dealer Sync API",
        description = "API for syncing dealer management system data through the partner gateway",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
