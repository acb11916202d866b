use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub photos_root_available: bool,
    pub archiver_available: bool,
    pub timestamp: i64,
}

/// Liveness probe; also reports whether archives can currently be served.
pub async fn health_check(State(app_state): State<AppState>) -> Json<HealthResponse> {
    let photos_root_available = app_state.locator.root_exists().await;
    let archiver_available = app_state.archiver.resolve().is_some();

    Json(HealthResponse {
        status: if photos_root_available && archiver_available {
            "ok"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        photos_root_available,
        archiver_available,
        timestamp: chrono::Utc::now().timestamp(),
    })
}
