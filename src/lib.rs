// Library exports for the server binary and tests

pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use services::archive_locator::ArchiveLocator;
use services::archive_process::ArchiveCommand;
use services::supervisor::CancellationSupervisor;
use utils::config::AppConfig;

/// Application state shared across handlers. Everything in it is read-only
/// after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub locator: Arc<ArchiveLocator>,
    pub archiver: Arc<ArchiveCommand>,
    pub supervisor: Arc<CancellationSupervisor>,
    /// Cancelled on server shutdown; every archive stream runs under a child.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            locator: Arc::new(ArchiveLocator::new(&config.photos_dir)),
            archiver: Arc::new(ArchiveCommand::new(&config.archiver)),
            supervisor: Arc::new(CancellationSupervisor::from_config(&config)),
            shutdown: CancellationToken::new(),
            config: Arc::new(config),
        }
    }
}

/// Build the application router with its middleware stack.
pub fn create_router(app_state: AppState) -> Router {
    let config = app_state.config.clone();

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);
    let cors = if config.allows_any_origin() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    };

    Router::new()
        // Landing page
        .route("/", get(handlers::index::index_page))

        // Health check endpoint
        .route("/health", get(handlers::health::health_check))

        // Streamed archives
        .route(
            "/archive/:archive_hash/",
            get(handlers::archive::download_archive),
        )

        // Add shared state
        .with_state(app_state)

        // Add middleware layers. The timeout only covers producing the
        // response head; streamed bodies are not cut off by it.
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    config.request_timeout_seconds,
                )))
                .layer(cors),
        )
}
