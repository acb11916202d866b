use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

/// Shown to the user for unknown or rejected archive names.
pub const ARCHIVE_NOT_FOUND_MESSAGE: &str = "Такого архива нет";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Archive not found: {archive}")]
    ArchiveNotFound { archive: String },

    #[error("Invalid archive name {archive:?}: {reason}")]
    InvalidArchiveName { archive: String, reason: String },

    #[error("Failed to start archiver: {message}")]
    ProcessSpawnFailure { message: String },

    #[error("Static asset unavailable: {message}")]
    StaticAssetMissing { message: String },

    #[error("Client disconnected")]
    ClientDisconnected,

    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ArchiveNotFound { .. } | AppError::InvalidArchiveName { .. } => {
                StatusCode::NOT_FOUND
            }
            // Nginx convention for "client closed request"; never actually written.
            AppError::ClientDisconnected => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST)
            }
            AppError::ProcessSpawnFailure { .. }
            | AppError::StaticAssetMissing { .. }
            | AppError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text rendered to the client. Internal details stay in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::ArchiveNotFound { .. } | AppError::InvalidArchiveName { .. } => {
                ARCHIVE_NOT_FOUND_MESSAGE
            }
            AppError::ClientDisconnected => "Download was interrupted",
            AppError::ProcessSpawnFailure { .. } => "Archive could not be created",
            AppError::StaticAssetMissing { .. } | AppError::InternalError { .. } => {
                "An unexpected error occurred"
            }
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if !self.is_client_error() {
            tracing::error!("Request failed: {}", self);
        }
        (self.status_code(), Html(self.user_message())).into_response()
    }
}

// Convenience functions for creating specific errors
impl AppError {
    pub fn archive_not_found(archive: impl Into<String>) -> Self {
        AppError::ArchiveNotFound { archive: archive.into() }
    }

    pub fn invalid_archive_name(archive: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::InvalidArchiveName {
            archive: archive.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn_failed(message: impl Into<String>) -> Self {
        AppError::ProcessSpawnFailure { message: message.into() }
    }

    pub fn static_asset_missing(message: impl Into<String>) -> Self {
        AppError::StaticAssetMissing { message: message.into() }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        AppError::InternalError { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants_share_status_and_message() {
        let missing = AppError::archive_not_found("nope");
        let rejected = AppError::invalid_archive_name("..", "parent directory");

        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(rejected.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.user_message(), ARCHIVE_NOT_FOUND_MESSAGE);
        assert_eq!(rejected.user_message(), ARCHIVE_NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_internal_failures_are_server_errors() {
        assert_eq!(
            AppError::spawn_failed("No such file or directory").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::static_asset_missing("index.html").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(!AppError::internal_error("boom").is_client_error());
    }

    #[test]
    fn test_display_keeps_details_for_logs() {
        let error = AppError::archive_not_found("vacation");
        assert_eq!(error.to_string(), "Archive not found: vacation");

        let error = AppError::spawn_failed("permission denied");
        assert!(error.to_string().contains("permission denied"));
    }

    #[test]
    fn test_into_response_hides_internal_details() {
        let response = AppError::spawn_failed("/usr/bin/zip: permission denied").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/html"));
    }
}
