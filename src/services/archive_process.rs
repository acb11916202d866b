//! External archiver process that writes a ZIP stream to its stdout.

use async_trait::async_trait;
use axum::body::Bytes;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::models::archive::ArchiveLocation;
use crate::models::errors::AppError;
use crate::services::stream_pump::{ChunkSource, ReaderSource};

/// Diagnostics kept from the archiver's stderr; the rest is discarded.
const STDERR_CAPTURE_LIMIT: usize = 64 * 1024;

/// Upper bound for draining pipes once the process has been told to stop.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How to invoke the archiver: `<program> -r - <entry>` run from the photos root.
#[derive(Debug, Clone)]
pub struct ArchiveCommand {
    program: OsString,
}

impl ArchiveCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate the program on `PATH` (or check an explicit path).
    pub fn resolve(&self) -> Option<PathBuf> {
        which::which(&self.program).ok()
    }

    /// Start archiving `location`. Nothing has been sent to the client yet, so
    /// a failure here can still become a proper error response.
    pub fn spawn(&self, location: &ArchiveLocation) -> Result<ArchiveProcess, AppError> {
        let mut child = Command::new(&self.program)
            .arg("-r")
            .arg("-")
            .arg(location.name.as_str())
            .current_dir(&location.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::spawn_failed(format!(
                    "{}: {}",
                    self.program.to_string_lossy(),
                    e
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::spawn_failed("archiver stdout was not captured"))?;
        let stderr = child.stderr.take().map(collect_stderr);

        tracing::debug!(
            pid = ?child.id(),
            archive = %location.name,
            cwd = %location.root.display(),
            "Archiver started"
        );

        Ok(ArchiveProcess {
            pid: child.id(),
            child,
            stdout: ReaderSource::new(stdout),
            stderr,
            exit: None,
        })
    }
}

/// How the archiver ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub status: ExitStatus,
    /// A kill was sent because the transfer stopped early.
    pub killed: bool,
    /// Captured (possibly truncated) stderr.
    pub stderr: String,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        !self.killed && self.status.success()
    }
}

/// A running archiver, owned by exactly one request.
///
/// Dropping it without calling [`finish`](Self::finish) or
/// [`terminate`](Self::terminate) kills the child and leaves reaping to the
/// runtime.
pub struct ArchiveProcess {
    child: Child,
    pid: Option<u32>,
    stdout: ReaderSource<ChildStdout>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    exit: Option<ProcessExit>,
}

impl ArchiveProcess {
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Next slice of archive bytes, at most `max_bytes`. `None` at end of stream.
    pub async fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Option<Bytes>> {
        if self.exit.is_some() {
            return Ok(None);
        }
        self.stdout.read_chunk(max_bytes).await
    }

    /// Wait for the archiver to exit on its own after its output ended.
    pub async fn finish(&mut self) -> io::Result<ProcessExit> {
        self.reap(false).await
    }

    /// Kill the archiver and wait for it. Calling this after the process has
    /// already been reaped returns the recorded exit.
    pub async fn terminate(&mut self) -> io::Result<ProcessExit> {
        self.reap(true).await
    }

    async fn reap(&mut self, kill: bool) -> io::Result<ProcessExit> {
        if let Some(exit) = &self.exit {
            return Ok(exit.clone());
        }

        if kill {
            match self.child.start_kill() {
                Ok(()) => {}
                // Already exited; wait() below collects the status.
                Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(mut stdout) = self.stdout.take() {
            let drained = tokio::time::timeout(
                DRAIN_TIMEOUT,
                tokio::io::copy(&mut stdout, &mut tokio::io::sink()),
            )
            .await;
            if let Ok(Ok(leftover)) = drained {
                if leftover > 0 {
                    tracing::debug!(pid = ?self.pid, bytes = leftover, "Discarded unsent archiver output");
                }
            }
        }

        let status = self.child.wait().await?;

        let stderr = match self.stderr.take() {
            Some(task) => match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
                Ok(Ok(captured)) => String::from_utf8_lossy(&captured).into_owned(),
                Ok(Err(e)) => {
                    tracing::warn!(pid = ?self.pid, "stderr collector failed: {}", e);
                    String::new()
                }
                Err(_) => String::new(),
            },
            None => String::new(),
        };

        let exit = ProcessExit {
            status,
            killed: kill,
            stderr,
        };
        tracing::debug!(pid = ?self.pid, status = %exit.status, killed = kill, "Archiver reaped");
        self.exit = Some(exit.clone());
        Ok(exit)
    }
}

#[async_trait]
impl ChunkSource for ArchiveProcess {
    async fn read_chunk(&mut self, max_bytes: usize) -> io::Result<Option<Bytes>> {
        ArchiveProcess::read_chunk(self, max_bytes).await
    }
}

impl Drop for ArchiveProcess {
    fn drop(&mut self) {
        if self.exit.is_none() {
            tracing::warn!(pid = ?self.pid, "Archiver dropped while running, killing it");
            let _ = self.child.start_kill();
            if let Some(task) = self.stderr.take() {
                task.abort();
            }
        }
    }
}

/// Keep reading stderr so the child never blocks on a full pipe.
fn collect_stderr(mut stderr: ChildStderr) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut captured = Vec::new();
        let mut chunk = vec![0u8; 4096];
        loop {
            match stderr.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let room = STDERR_CAPTURE_LIMIT.saturating_sub(captured.len());
                    captured.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
        captured
    })
}
