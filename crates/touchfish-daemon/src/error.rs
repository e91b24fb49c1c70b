//! Error types for the touchfish daemon.

use tokio_util::codec::LinesCodecError;

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] touchfish_core::Error),

    /// Line framing error on stdin
    #[error("Codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// `serve` called a second time on the same daemon
    #[error("Daemon is already serving a client")]
    AlreadyServing,
}

pub type Result<T> = std::result::Result<T, DaemonError>;
