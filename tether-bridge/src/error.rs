use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the task queue, the socket service and the channel.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(#[from] tether_core::CoreError),

    #[error("host error: {0}")]
    Host(#[from] tether_host::HostError),

    #[error("sync error: {0}")]
    Sync(#[from] tether_sync::SyncError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("task queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("host task {seq} was abandoned before it answered")]
    TaskAbandoned { seq: u64 },

    #[error("bridge protocol error: {0}")]
    Protocol(String),

    #[error("another host of this version is already listening on {socket}")]
    HostAlreadyRunning { socket: PathBuf },

    #[error("host service {task} ended abnormally: {reason}")]
    ServiceTask { task: &'static str, reason: String },

    #[error("host is not running (socket missing: {socket})")]
    HostNotRunning { socket: PathBuf },

    #[error("host version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("unknown action {0}")]
    UnknownAction(uuid::Uuid),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BridgeError {
    BridgeError::Io {
        path: path.into(),
        source,
    }
}
