use axum::{extract::State, response::Html};
use tokio::fs as async_fs;

use crate::models::errors::AppError;
use crate::AppState;

/// Serve the landing page from disk.
pub async fn index_page(State(app_state): State<AppState>) -> Result<Html<String>, AppError> {
    let path = &app_state.config.index_path;

    let contents = async_fs::read_to_string(path).await.map_err(|e| {
        AppError::static_asset_missing(format!("{}: {}", path.display(), e))
    })?;

    Ok(Html(contents))
}
