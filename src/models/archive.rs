use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::errors::AppError;

/// A client-supplied archive identifier that is safe to use as a single path
/// segment and as an archiver argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveName(String);

impl ArchiveName {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let reject = |reason: &str| Err(AppError::invalid_archive_name(raw, reason));

        if raw.is_empty() {
            return reject("empty name");
        }
        if raw == "." || raw == ".." {
            return reject("relative directory reference");
        }
        if raw.contains(['/', '\\']) {
            return reject("contains a path separator");
        }
        if raw.chars().any(char::is_control) {
            return reject("contains a control character");
        }
        // The archiver would read it as an option.
        if raw.starts_with('-') {
            return reject("starts with '-'");
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name offered to the browser.
    pub fn download_filename(&self) -> String {
        format!("{}.zip", self.0)
    }

    pub fn content_disposition(&self) -> String {
        let filename = self.download_filename().replace('"', "\\\"");
        format!("attachment; filename=\"{}\"", filename)
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated request whose directory exists under the photos root.
#[derive(Debug, Clone)]
pub struct ArchiveLocation {
    pub name: ArchiveName,
    /// Canonical photos root; the archiver runs here.
    pub root: PathBuf,
    /// Canonical directory being archived.
    pub directory: PathBuf,
}

/// Bytes and writes pushed to the client during one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferStats {
    pub bytes: u64,
    pub chunks: u64,
}

impl TransferStats {
    pub fn record(&mut self, chunk_len: usize) {
        self.bytes += chunk_len as u64;
        self.chunks += 1;
    }
}

/// Why a transfer stopped before the archiver's output was exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interruption {
    /// Writing to the response failed.
    ClientDisconnected,
    /// The request scope was cancelled (body dropped or server shutdown).
    Cancelled,
    /// The archiver produced nothing for this long.
    IdleTimeout(Duration),
    /// Reading the archiver's output failed.
    SourceFailed(String),
}

impl Interruption {
    /// Disconnects and cancellations are the client's doing, not a fault.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Interruption::ClientDisconnected | Interruption::Cancelled)
    }
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::ClientDisconnected => f.write_str("client disconnected"),
            Interruption::Cancelled => f.write_str("request cancelled"),
            Interruption::IdleTimeout(after) => {
                write!(f, "archiver produced no output for {:?}", after)
            }
            Interruption::SourceFailed(reason) => write!(f, "reading archiver output failed: {}", reason),
        }
    }
}

/// Terminal state of an archive response once streaming has begun.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed(TransferStats),
    Cancelled {
        stats: TransferStats,
        reason: Interruption,
    },
    Failed {
        stats: TransferStats,
        reason: String,
    },
}

impl StreamOutcome {
    pub fn stats(&self) -> TransferStats {
        match self {
            StreamOutcome::Completed(stats)
            | StreamOutcome::Cancelled { stats, .. }
            | StreamOutcome::Failed { stats, .. } => *stats,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed(_))
    }
}
