use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

use crate::models::errors::AppError;
use crate::services::supervisor::ArchiveBody;
use crate::AppState;

const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Stream `/archive/{archive_hash}/` as a freshly built ZIP.
///
/// Everything that can fail cleanly (lookup, starting the archiver) happens
/// before the response is returned. Once axum has the response the headers
/// are committed and the supervisor task owns the rest of the transfer.
pub async fn download_archive(
    State(app_state): State<AppState>,
    Path(archive_hash): Path<String>,
) -> Result<Response, AppError> {
    let logging = app_state.config.logging;

    let location = app_state.locator.locate(&archive_hash).await.map_err(|e| {
        if logging {
            tracing::error!("no archive with name: {}", archive_hash);
        }
        tracing::debug!("Archive lookup failed: {}", e);
        e
    })?;

    let process = app_state.archiver.spawn(&location)?;

    let scope = app_state.shutdown.child_token();
    let (sink, body) = ArchiveBody::channel(&scope);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, ZIP_CONTENT_TYPE)
        .header(header::CONTENT_DISPOSITION, location.name.content_disposition())
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(body))
        .map_err(|e| AppError::internal_error(format!("Failed to build archive response: {}", e)))?;

    let stream_id = Uuid::new_v4();
    let span = tracing::info_span!("archive_stream", %stream_id, archive = %location.name);
    let supervisor = app_state.supervisor.clone();

    tokio::spawn(
        async move {
            let outcome = supervisor.supervise(process, sink, scope).await;
            tracing::debug!(?outcome, "Archive stream finished");
        }
        .instrument(span),
    );

    if logging {
        tracing::debug!(archive = %location.name, "send headers");
    }

    Ok(response)
}
