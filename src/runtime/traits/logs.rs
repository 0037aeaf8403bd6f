// ABOUTME: Log operations trait for container runtimes.
// ABOUTME: Stream container logs with tail and follow options.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Boxed stream of log lines.
pub type LogLines = Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>;

/// Log streaming operations.
#[async_trait]
pub trait LogOps: Send + Sync {
    /// Stream logs from a container.
    async fn container_logs(&self, id: &str, opts: &LogOptions) -> Result<LogLines, LogError>;
}

/// Options for log streaming.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Include stdout.
    pub stdout: bool,
    /// Include stderr.
    pub stderr: bool,
    /// Follow log output (like `tail -f`).
    pub follow: bool,
    /// Show timestamps.
    pub timestamps: bool,
    /// Number of lines to show from end (None = all).
    pub tail: Option<u64>,
}

impl LogOptions {
    /// Tail the last `n` lines, optionally following.
    pub fn tail(n: u64, follow: bool) -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow,
            timestamps: false,
            tail: Some(n),
        }
    }
}

/// A single log line from a container.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// The log content.
    pub content: String,
    /// Whether this is from stdout or stderr.
    pub stream: LogStream,
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Errors from log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("stream error: {0}")]
    StreamError(String),
}
