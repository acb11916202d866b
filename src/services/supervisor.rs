//! Ties an archiver process to the lifetime of the HTTP response that
//! streams it. Whatever happens to the transfer, the process is reaped before
//! [`CancellationSupervisor::supervise`] returns.

use futures_util::Stream;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::models::archive::{Interruption, StreamOutcome};
use crate::services::archive_process::ArchiveProcess;
use crate::services::stream_pump::{BodyChunk, ChunkSink, StreamPump};
use crate::utils::config::AppConfig;

/// Response body fed by the pump.
///
/// The HTTP server drops the body when the client goes away (or when the
/// response is discarded before being sent); that cancels the request scope.
pub struct ArchiveBody {
    rx: mpsc::Receiver<BodyChunk>,
    _scope: DropGuard,
}

impl ArchiveBody {
    /// Create the body and the sender the pump writes into. Capacity one keeps
    /// the pump at most a single chunk ahead of the client.
    pub fn channel(scope: &CancellationToken) -> (mpsc::Sender<BodyChunk>, ArchiveBody) {
        let (tx, rx) = mpsc::channel(1);
        let body = ArchiveBody {
            rx,
            _scope: scope.clone().drop_guard(),
        };
        (tx, body)
    }
}

impl Stream for ArchiveBody {
    type Item = BodyChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Runs the pump for one request and cleans up after it.
#[derive(Debug, Clone)]
pub struct CancellationSupervisor {
    pump: StreamPump,
    logging: bool,
}

impl CancellationSupervisor {
    pub fn new(pump: StreamPump, logging: bool) -> Self {
        Self { pump, logging }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(StreamPump::from_config(config), config.logging)
    }

    /// Stream `process` into `sink` until it ends or `cancel` fires.
    ///
    /// Headers are already committed when this runs, so anything short of a
    /// clean finish can only cut the body short: the sink is aborted and a
    /// client that is still connected sees an incomplete download.
    pub async fn supervise<K>(
        &self,
        mut process: ArchiveProcess,
        mut sink: K,
        cancel: CancellationToken,
    ) -> StreamOutcome
    where
        K: ChunkSink,
    {
        let report = self.pump.run(&mut process, &mut sink, &cancel).await;
        let stats = report.stats;

        let interruption = match report.interruption {
            Some(interruption) => interruption,
            None => {
                let exit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Interruption::Cancelled),
                    exit = process.finish() => Ok(exit),
                };

                match exit {
                    Ok(Ok(exit)) if exit.success() => {
                        if self.logging {
                            tracing::info!(bytes = stats.bytes, chunks = stats.chunks, "Send all");
                        }
                        return StreamOutcome::Completed(stats);
                    }
                    Ok(Ok(exit)) => {
                        let reason = format!("archiver exited with {}", exit.status);
                        tracing::warn!(stderr = %exit.stderr.trim(), "{}", reason);
                        sink.abort(io::Error::other(reason.clone())).await;
                        return StreamOutcome::Failed { stats, reason };
                    }
                    Ok(Err(e)) => {
                        let reason = format!("waiting for archiver failed: {}", e);
                        tracing::error!("{}", reason);
                        sink.abort(io::Error::other(reason.clone())).await;
                        self.terminate(&mut process).await;
                        return StreamOutcome::Failed { stats, reason };
                    }
                    Err(interruption) => interruption,
                }
            }
        };

        self.terminate(&mut process).await;

        if interruption.is_cancellation() {
            if self.logging {
                tracing::error!(
                    bytes = stats.bytes,
                    reason = %interruption,
                    "Download was interrupted"
                );
            }
            sink.abort(io::Error::new(
                io::ErrorKind::Interrupted,
                interruption.to_string(),
            ))
            .await;
            StreamOutcome::Cancelled {
                stats,
                reason: interruption,
            }
        } else {
            tracing::warn!(bytes = stats.bytes, "Archive stream failed: {}", interruption);
            sink.abort(io::Error::other(interruption.to_string())).await;
            StreamOutcome::Failed {
                stats,
                reason: interruption.to_string(),
            }
        }
    }

    async fn terminate(&self, process: &mut ArchiveProcess) {
        match process.terminate().await {
            Ok(exit) => {
                if !exit.stderr.trim().is_empty() {
                    tracing::debug!(stderr = %exit.stderr.trim(), "Archiver diagnostics");
                }
            }
            Err(e) => tracing::error!(pid = ?process.id(), "Failed to terminate archiver: {}", e),
        }
    }
}
