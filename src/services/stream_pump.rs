//! Moves archiver output to the HTTP response one bounded chunk at a time.
//!
//! Every suspension point (reading the source, writing the sink, the optional
//! low-speed pause) races the request's cancellation token, so a disconnect is
//! noticed within one pending operation.

use async_trait::async_trait;
use axum::body::Bytes;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::archive::{Interruption, TransferStats};
use crate::utils::config::AppConfig;

/// A source of archive bytes.
#[async_trait]
pub trait ChunkSource: Send {
    /// Read at most `max_bytes`. `Ok(None)` means end of stream.
    async fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Option<Bytes>>;
}

/// The open response body.
#[async_trait]
pub trait ChunkSink: Send {
    /// Deliver one chunk. An error means the client is gone.
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), SinkClosed>;

    /// End the body with an error so the client sees a truncated transfer
    /// rather than a well-formed end of stream.
    async fn abort(&mut self, error: io::Error);
}

/// The receiving side of the response body has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// How long an abort waits for room in a body channel nobody is draining.
const ABORT_TIMEOUT: Duration = Duration::from_secs(5);

/// Item type carried from the pump to the HTTP body.
pub type BodyChunk = Result<Bytes, io::Error>;

#[async_trait]
impl ChunkSink for mpsc::Sender<BodyChunk> {
    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.send(Ok(chunk)).await.map_err(|_| SinkClosed)
    }

    async fn abort(&mut self, error: io::Error) {
        // Fails when the receiver is gone or the client stopped reading.
        let _ = self.send_timeout(Err(error), ABORT_TIMEOUT).await;
    }
}

/// Adapts any async reader into a [`ChunkSource`].
pub struct ReaderSource<R> {
    reader: Option<R>,
}

impl<R> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.reader.is_none()
    }

    /// Give the reader back, e.g. to drain it.
    pub fn take(&mut self) -> Option<R> {
        self.reader.take()
    }
}

#[async_trait]
impl<R> ChunkSource for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Option<Bytes>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; max_bytes.max(1)];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            self.reader = None;
            return Ok(None);
        }

        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }
}

/// Result of driving one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpReport {
    pub stats: TransferStats,
    /// `None` when the source reached end of stream.
    pub interruption: Option<Interruption>,
}

impl PumpReport {
    pub fn drained(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Transfer loop settings, fixed for the lifetime of the server.
#[derive(Debug, Clone)]
pub struct StreamPump {
    chunk_size: usize,
    throttle: Option<Duration>,
    idle_timeout: Option<Duration>,
    log_chunks: bool,
}

impl StreamPump {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            throttle: None,
            idle_timeout: None,
            log_chunks: false,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.chunk_size)
            .with_throttle(config.throttle_delay())
            .with_idle_timeout(config.read_idle_timeout())
            .with_chunk_logging(config.logging)
    }

    pub fn with_throttle(mut self, throttle: Option<Duration>) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_chunk_logging(mut self, enabled: bool) -> Self {
        self.log_chunks = enabled;
        self
    }

    /// Copy `source` into `sink` until end of stream, a failed write, or
    /// cancellation. Never touches the sink after an interruption.
    pub async fn run<S, K>(
        &self,
        source: &mut S,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> PumpReport
    where
        S: ChunkSource + ?Sized,
        K: ChunkSink + ?Sized,
    {
        let mut stats = TransferStats::default();

        let interruption = loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(Interruption::Cancelled),
                read = self.read_next(source) => read,
            };

            let chunk = match read {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break None,
                Err(interruption) => break Some(interruption),
            };

            // Nothing to send; avoid an empty frame.
            if chunk.is_empty() {
                continue;
            }

            let len = chunk.len();
            if self.log_chunks {
                tracing::info!(bytes = len, "Sending archive chunk ...");
            }

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(Interruption::Cancelled),
                sent = sink.send_chunk(chunk) => sent,
            };
            if sent.is_err() {
                break Some(Interruption::ClientDisconnected);
            }
            stats.record(len);

            if let Some(delay) = self.throttle {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Some(Interruption::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        };

        PumpReport {
            stats,
            interruption,
        }
    }

    async fn read_next<S>(&self, source: &mut S) -> Result<Option<Bytes>, Interruption>
    where
        S: ChunkSource + ?Sized,
    {
        let read = source.read_chunk(self.chunk_size);
        let result = match self.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => return Err(Interruption::IdleTimeout(limit)),
            },
            None => read.await,
        };

        result.map_err(|e| Interruption::SourceFailed(e.to_string()))
    }
}
