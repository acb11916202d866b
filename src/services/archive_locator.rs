use std::path::PathBuf;
use tokio::fs as async_fs;

use crate::models::archive::{ArchiveLocation, ArchiveName};
use crate::models::errors::AppError;

/// Maps archive identifiers to directories under the photos root.
#[derive(Debug, Clone)]
pub struct ArchiveLocator {
    root: PathBuf,
}

impl ArchiveLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `identifier` to an existing directory under the root.
    ///
    /// Names that are not a single plain path segment are rejected before the
    /// filesystem is touched. Symlinks are followed, but the resolved directory
    /// must still live under the canonical root.
    pub async fn locate(&self, identifier: &str) -> Result<ArchiveLocation, AppError> {
        let name = ArchiveName::parse(identifier)?;

        let root = async_fs::canonicalize(&self.root).await.map_err(|e| {
            tracing::warn!("Photos root {} is unavailable: {}", self.root.display(), e);
            AppError::archive_not_found(identifier)
        })?;

        let directory = match async_fs::canonicalize(root.join(name.as_str())).await {
            Ok(path) => path,
            Err(_) => return Err(AppError::archive_not_found(identifier)),
        };

        if !directory.starts_with(&root) || directory == root {
            return Err(AppError::invalid_archive_name(
                identifier,
                "resolves outside the photos root",
            ));
        }

        let metadata = async_fs::metadata(&directory)
            .await
            .map_err(|_| AppError::archive_not_found(identifier))?;
        if !metadata.is_dir() {
            return Err(AppError::archive_not_found(identifier));
        }

        Ok(ArchiveLocation {
            name,
            root,
            directory,
        })
    }

    /// Whether the configured root exists right now.
    pub async fn root_exists(&self) -> bool {
        async_fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}
